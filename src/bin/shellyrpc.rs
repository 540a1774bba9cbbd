//! Call an RPC method on a Shelly device over BLE and dump the result as JSON.
//!
//! Method names and parameters can be found, e.g. for the BLU TRV, at
//! <https://shelly-api-docs.shelly.cloud/docs-ble/Devices/trv#rpc-commands>.
//!
//! Exit codes: 10 setup, 20 params, 30 device error, 40 call, 50 output,
//! 90 teardown.

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::error;
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use shelly_rpc::platform::BtleplugManager;
use shelly_rpc::session::{self, SessionError};
use shelly_rpc::{RpcError, SetupOptions};

const EXIT_SETUP: u8 = 10;
const EXIT_PARAMS: u8 = 20;
const EXIT_DEVICE_ERROR: u8 = 30;
const EXIT_CALL: u8 = 40;
const EXIT_OUTPUT: u8 = 50;
const EXIT_TEARDOWN: u8 = 90;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Shelly device address
    #[arg(long, default_value = "f8:44:77:21:12:55")]
    addr: String,

    /// RPC method to call
    #[arg(long, default_value = "Shelly.GetConfig")]
    method: String,

    /// RPC method parameters as JSON blob
    #[arg(long, default_value = "null")]
    params: String,

    /// Local adapter, e.g. hci1 (default: first adapter)
    #[arg(long)]
    adapter: Option<String>,

    #[arg(long)]
    service_uuid: Option<Uuid>,

    #[arg(long)]
    data_uuid: Option<Uuid>,

    #[arg(long)]
    tx_ctl_uuid: Option<Uuid>,

    #[arg(long)]
    rx_ctl_uuid: Option<Uuid>,

    /// Seconds allowed for finding and connecting to the device
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Seconds allowed for every other operation
    #[arg(long)]
    timeout: Option<u64>,

    /// Chunk size for characteristic reads and writes
    #[arg(long)]
    mtu: Option<usize>,
}

impl Cli {
    fn setup_options(&self) -> SetupOptions {
        SetupOptions {
            address: self.addr.clone(),
            adapter: self.adapter.clone(),
            service_uuid: self.service_uuid,
            data_uuid: self.data_uuid,
            tx_ctl_uuid: self.tx_ctl_uuid,
            rx_ctl_uuid: self.rx_ctl_uuid,
            connect_timeout: self.connect_timeout.map(Duration::from_secs),
            timeout: self.timeout.map(Duration::from_secs),
            mtu: self.mtu,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    ExitCode::from(run(Cli::parse()))
}

fn run(cli: Cli) -> u8 {
    let params: Value = match serde_json::from_str(&cli.params) {
        Ok(params) => params,
        Err(e) => {
            error!("Failed to unmarshal params: {e}");
            return EXIT_PARAMS;
        }
    };

    let mut manager = match BtleplugManager::new() {
        Ok(manager) => manager,
        Err(e) => {
            error!("Failed to setup RPC client: {e}");
            return EXIT_SETUP;
        }
    };

    let method = cli.method.as_str();
    let outcome = session::run(&mut manager, &cli.setup_options(), |client| {
        let result = client.call(method, params.clone())?;
        Ok(print_json(&result))
    });

    match outcome {
        Ok(code) => code,
        Err(SessionError::Setup(e)) => {
            error!("Failed to setup RPC client: {e}");
            EXIT_SETUP
        }
        Err(SessionError::Call(e)) => report_call_failure(method, &params, &e),
        Err(SessionError::Teardown { source, prior }) => {
            if let Some(e) = prior {
                report_call_failure(method, &params, &e);
            }
            error!("Failed to teardown RPC client: {source}");
            EXIT_TEARDOWN
        }
    }
}

fn report_call_failure(method: &str, params: &Value, err: &RpcError) -> u8 {
    match err.application() {
        Some(envelope) => match print_json(&json!({ "RPCError": envelope })) {
            0 => EXIT_DEVICE_ERROR,
            code => code,
        },
        None => {
            error!("Failed to call {method:?} with {params}: {err}");
            EXIT_CALL
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> u8 {
    let mut stdout = io::stdout().lock();
    let written = serde_json::to_writer_pretty(&mut stdout, value)
        .map_err(io::Error::from)
        .and_then(|()| writeln!(stdout));
    match written {
        Ok(()) => 0,
        Err(e) => {
            error!("Failed to encode response: {e}");
            EXIT_OUTPUT
        }
    }
}
