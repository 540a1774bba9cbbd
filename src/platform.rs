//! btleplug-backed [`ConnectionManager`]
//!
//! btleplug is async; the RPC core is blocking. The manager owns a small
//! tokio runtime and blocks on it for every radio operation, so callers never
//! see a future.
//!
//! btleplug does not report the negotiated MTU, so chunk sizes come from
//! [`SetupOptions::mtu`] (20 bytes unless configured). A characteristic read
//! returns the whole attribute value; bytes that do not fit the caller's
//! buffer are kept for the next read of the same exchange. Any write on the
//! link starts a new exchange and discards what is left over.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use btleplug::api::{
    Central, Characteristic as GattCharacteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use uuid::Uuid;

use crate::chunked::ValueBuffer;
use crate::config::{GattProfile, MacAddress, SetupOptions};
use crate::transport::{
    Characteristic, Connection, ConnectionError, ConnectionManager, TransportError,
};

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(200);

// ============================================================================
// Characteristic
// ============================================================================

#[derive(Debug, Error)]
pub enum BleError {
    #[error(transparent)]
    Btleplug(#[from] btleplug::Error),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError for BleError {}

/// One GATT characteristic of a connected peripheral
pub struct BleCharacteristic {
    runtime: Arc<Runtime>,
    peripheral: Peripheral,
    characteristic: GattCharacteristic,
    mtu: usize,
    timeout: Duration,
    held: ValueBuffer,
    /// Shared by the three characteristics of one link
    exchange: Arc<AtomicU64>,
}

impl BleCharacteristic {
    pub fn uuid(&self) -> Uuid {
        self.characteristic.uuid
    }
}

fn block_on<T, F>(runtime: &Runtime, timeout: Duration, future: F) -> Result<T, BleError>
where
    F: Future<Output = Result<T, btleplug::Error>>,
{
    runtime
        .block_on(async { tokio::time::timeout(timeout, future).await })
        .map_err(|_| BleError::Timeout(timeout))?
        .map_err(BleError::from)
}

impl Characteristic for BleCharacteristic {
    type Error = BleError;

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        let exchange = self.exchange.load(Ordering::Acquire);
        let (runtime, timeout) = (&self.runtime, self.timeout);
        let (peripheral, characteristic) = (&self.peripheral, &self.characteristic);
        self.held.read_with(buffer, exchange, || {
            block_on(runtime, timeout, peripheral.read(characteristic))
        })
    }

    fn write_without_response(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        self.exchange.fetch_add(1, Ordering::AcqRel);
        self.held.clear();
        block_on(
            &self.runtime,
            self.timeout,
            self.peripheral
                .write(&self.characteristic, data, WriteType::WithoutResponse),
        )?;
        Ok(data.len())
    }

    fn mtu(&self) -> Result<usize, Self::Error> {
        Ok(self.mtu)
    }
}

// ============================================================================
// Manager
// ============================================================================

pub struct BtleplugManager {
    runtime: Arc<Runtime>,
    manager: Manager,
}

impl BtleplugManager {
    pub fn new() -> Result<Self, ConnectionError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| ConnectionError::backend("start runtime", e))?;
        let manager = runtime
            .block_on(Manager::new())
            .map_err(|e| ConnectionError::backend("create bluetooth manager", e))?;
        Ok(Self {
            runtime: Arc::new(runtime),
            manager,
        })
    }

    fn adapter(&self, name: Option<&str>) -> Result<Adapter, ConnectionError> {
        self.runtime.block_on(async {
            let adapters = self
                .manager
                .adapters()
                .await
                .map_err(|e| ConnectionError::backend("list adapters", e))?;

            let Some(name) = name else {
                return adapters
                    .into_iter()
                    .next()
                    .ok_or_else(|| ConnectionError::Adapter("no bluetooth adapter found".into()));
            };
            for adapter in adapters {
                let info = adapter
                    .adapter_info()
                    .await
                    .map_err(|e| ConnectionError::backend("query adapter", e))?;
                if info.starts_with(name) {
                    return Ok(adapter);
                }
            }
            Err(ConnectionError::Adapter(format!("adapter {name:?} not found")))
        })
    }

    async fn find_peripheral(
        adapter: &Adapter,
        address: MacAddress,
        timeout: Duration,
    ) -> Result<Peripheral, ConnectionError> {
        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| ConnectionError::backend("start scan", e))?;

        let found = tokio::time::timeout(timeout, poll_peripherals(adapter, address)).await;

        if let Err(e) = adapter.stop_scan().await {
            warn!("stop scan: {e}");
        }
        match found {
            Ok(peripheral) => peripheral.map_err(|e| ConnectionError::backend("scan", e)),
            Err(_) => Err(ConnectionError::DeviceNotFound(address.to_string())),
        }
    }

    async fn discover(
        peripheral: &Peripheral,
        profile: GattProfile,
        timeout: Duration,
    ) -> Result<[GattCharacteristic; 3], ConnectionError> {
        tokio::time::timeout(timeout, peripheral.discover_services())
            .await
            .map_err(|_| ConnectionError::Timeout {
                context: "discover services",
            })?
            .map_err(|e| ConnectionError::backend("discover services", e))?;

        let service = peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == profile.service)
            .ok_or(ConnectionError::ServiceNotFound(profile.service))?;

        let find = |uuid: Uuid| {
            service
                .characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or(ConnectionError::CharacteristicNotFound(uuid))
        };
        Ok([find(profile.data)?, find(profile.tx_ctl)?, find(profile.rx_ctl)?])
    }

    async fn disconnect(peripheral: &Peripheral, timeout: Duration) -> Result<(), ConnectionError> {
        tokio::time::timeout(timeout, peripheral.disconnect())
            .await
            .map_err(|_| ConnectionError::Timeout {
                context: "disconnect",
            })?
            .map_err(|e| ConnectionError::backend("disconnect from device", e))
    }

    fn bind(
        &self,
        peripheral: &Peripheral,
        characteristic: GattCharacteristic,
        options: &SetupOptions,
        exchange: &Arc<AtomicU64>,
    ) -> BleCharacteristic {
        BleCharacteristic {
            runtime: Arc::clone(&self.runtime),
            peripheral: peripheral.clone(),
            characteristic,
            mtu: options.resolved_mtu(),
            timeout: options.resolved_timeout(),
            held: ValueBuffer::new(),
            exchange: Arc::clone(exchange),
        }
    }
}

async fn poll_peripherals(
    adapter: &Adapter,
    address: MacAddress,
) -> Result<Peripheral, btleplug::Error> {
    loop {
        let peripherals = adapter.peripherals().await?;
        if let Some(peripheral) = peripherals
            .into_iter()
            .find(|p| p.address().into_inner() == address.octets())
        {
            return Ok(peripheral);
        }
        tokio::time::sleep(SCAN_POLL_INTERVAL).await;
    }
}

impl ConnectionManager for BtleplugManager {
    type Characteristic = BleCharacteristic;

    fn setup(
        &mut self,
        options: &SetupOptions,
    ) -> Result<Connection<BleCharacteristic>, ConnectionError> {
        let address = options.mac_address()?;
        let profile = options.gatt_profile();
        let connect_timeout = options.resolved_connect_timeout();
        let timeout = options.resolved_timeout();

        let adapter = self.adapter(options.adapter.as_deref())?;

        let peripheral = self.runtime.block_on(async {
            let peripheral = Self::find_peripheral(&adapter, address, connect_timeout).await?;
            tokio::time::timeout(connect_timeout, peripheral.connect())
                .await
                .map_err(|_| ConnectionError::Timeout {
                    context: "connect to device",
                })?
                .map_err(|e| ConnectionError::backend("connect to device", e))?;
            Ok::<_, ConnectionError>(peripheral)
        })?;
        info!("connected to {address}");

        let discovered = self.runtime.block_on(async {
            match Self::discover(&peripheral, profile, timeout).await {
                Ok(chars) => Ok(chars),
                Err(source) => match Self::disconnect(&peripheral, timeout).await {
                    Ok(()) => Err(source),
                    Err(disconnect) => Err(ConnectionError::Aborted {
                        source: Box::new(source),
                        disconnect: Box::new(disconnect),
                    }),
                },
            }
        })?;
        let [data, tx_ctl, rx_ctl] = discovered;
        debug!(
            "bound characteristics data={} tx_ctl={} rx_ctl={}",
            data.uuid, tx_ctl.uuid, rx_ctl.uuid
        );

        let exchange = Arc::new(AtomicU64::new(0));
        Ok(Connection::new(
            self.bind(&peripheral, data, options, &exchange),
            self.bind(&peripheral, tx_ctl, options, &exchange),
            self.bind(&peripheral, rx_ctl, options, &exchange),
        ))
    }

    fn teardown(&mut self, connection: Connection<BleCharacteristic>) -> Result<(), ConnectionError> {
        let (data, _, _) = connection.into_parts();
        let timeout = data.timeout;
        self.runtime
            .block_on(Self::disconnect(&data.peripheral, timeout))?;
        info!("disconnected from {}", data.peripheral.address());
        Ok(())
    }
}
