//! Shelly / Mongoose OS RPC over Bluetooth Low Energy
//!
//! The device exposes one GATT service with three characteristics:
//!
//! | Characteristic | Direction | Carries                                  |
//! |----------------|-----------|------------------------------------------|
//! | data           | both      | JSON request / response bytes, chunked   |
//! | tx ctl         | write     | 4-byte big-endian length of the request  |
//! | rx ctl         | read      | 4-byte big-endian length of the response |
//!
//! # Usage
//! ```ignore
//! use shelly_rpc::{RpcClient, SetupOptions, ConnectionManager};
//! use shelly_rpc::platform::BtleplugManager;
//! use serde_json::json;
//!
//! let mut manager = BtleplugManager::new()?;
//! let connection = manager.setup(&SetupOptions::new("f8:44:77:21:12:55"))?;
//!
//! let mut client = RpcClient::new(connection);
//! let config = client.call("Shelly.GetConfig", json!(null))?;
//!
//! manager.teardown(client.into_connection())?;
//! ```

pub mod chunked;
pub mod config;
pub mod frame;
pub mod id;
#[cfg(feature = "btleplug")]
pub mod platform;
pub mod session;
pub mod shelly;
mod transport;

pub use chunked::TransportFault;
pub use config::{GattProfile, MacAddress, SetupOptions};
pub use frame::{ErrorEnvelope, RequestFrame, ResponseFrame, SOURCE_NAME};
pub use id::{IdSource, RandomIds};
pub use transport::{
    BoxError, Characteristic, Connection, ConnectionError, ConnectionManager, TransportError,
};

use core::fmt;

use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Step of a call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    EncodeParams,
    EncodeRequest,
    WriteRequestLength,
    WriteRequest,
    ReadResponseLength,
    ReadResponse,
    DecodeResponse,
    DecodeResult,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::EncodeParams => write!(f, "encode params"),
            Phase::EncodeRequest => write!(f, "marshal request"),
            Phase::WriteRequestLength => {
                write!(f, "write request length to TX control characteristic")
            }
            Phase::WriteRequest => write!(f, "write request to data characteristic"),
            Phase::ReadResponseLength => {
                write!(f, "read response length from RX control characteristic")
            }
            Phase::ReadResponse => write!(f, "read response from data characteristic"),
            Phase::DecodeResponse => write!(f, "unmarshal response"),
            Phase::DecodeResult => write!(f, "decode result"),
        }
    }
}

/// The response did not belong to the request that was sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("wrong response ID, expected: {expected}, got: {actual}")]
    Id { expected: u64, actual: u64 },
    #[error("wrong response destination, expected: {expected}, got: {actual}")]
    Destination { expected: String, actual: String },
}

/// RPC client errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("{phase}: {source}")]
    Transport {
        phase: Phase,
        #[source]
        source: TransportFault,
    },
    #[error("{phase}: {source}")]
    Encoding {
        phase: Phase,
        #[source]
        source: serde_json::Error,
    },
    #[error("request of {0} bytes does not fit the 4-byte length prefix")]
    PayloadTooLarge(usize),
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    /// The device answered, but the call itself failed
    #[error(transparent)]
    Application(#[from] ErrorEnvelope),
}

impl RpcError {
    /// Whether the device rejected the call, as opposed to the exchange failing
    pub fn is_application(&self) -> bool {
        matches!(self, RpcError::Application(_))
    }

    pub fn application(&self) -> Option<&ErrorEnvelope> {
        match self {
            RpcError::Application(envelope) => Some(envelope),
            _ => None,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            RpcError::Transport { phase, .. } | RpcError::Encoding { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    fn transport(phase: Phase) -> impl FnOnce(TransportFault) -> Self {
        move |source| RpcError::Transport { phase, source }
    }

    fn encoding(phase: Phase) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| RpcError::Encoding { phase, source }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Shelly RPC client
///
/// Owns one [`Connection`] for its whole life. Calls take `&mut self`: the
/// protocol has no multiplexing, so at most one call may be in flight. Share
/// a client across threads behind a `Mutex`.
///
/// Generic over the characteristic implementation and over the
/// [`IdSource`] used for correlation ids.
pub struct RpcClient<C: Characteristic, I: IdSource = RandomIds> {
    connection: Connection<C>,
    ids: I,
    source: String,
}

impl<C: Characteristic> RpcClient<C> {
    pub fn new(connection: Connection<C>) -> Self {
        Self::with_ids(connection, RandomIds::new())
    }
}

impl<C: Characteristic, I: IdSource> RpcClient<C, I> {
    pub fn with_ids(connection: Connection<C>, ids: I) -> Self {
        Self {
            connection,
            ids,
            source: SOURCE_NAME.to_string(),
        }
    }

    /// Override the `src` this client announces in requests
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn connection(&self) -> &Connection<C> {
        &self.connection
    }

    /// Release the connection, e.g. to tear it down
    pub fn into_connection(self) -> Connection<C> {
        self.connection
    }

    /// Send one request frame and read back one response frame
    ///
    /// No correlation checks happen here; prefer [`call`](Self::call) unless
    /// the raw frames are needed.
    pub fn roundtrip(&mut self, request: &RequestFrame) -> Result<ResponseFrame, RpcError> {
        let payload = frame::encode(request).map_err(RpcError::encoding(Phase::EncodeRequest))?;
        let length =
            u32::try_from(payload.len()).map_err(|_| RpcError::PayloadTooLarge(payload.len()))?;

        debug!(
            "request {} {:?}: writing {} bytes",
            request.id, request.method, length
        );
        chunked::write_once(&mut self.connection.tx_ctl, &chunked::encode_length(length))
            .map_err(RpcError::transport(Phase::WriteRequestLength))?;
        chunked::write_chunked(&mut self.connection.data, &payload)
            .map_err(RpcError::transport(Phase::WriteRequest))?;

        let response_length = chunked::read_length(&mut self.connection.rx_ctl)
            .map_err(RpcError::transport(Phase::ReadResponseLength))?;
        debug!("request {}: reading {} bytes", request.id, response_length);
        let response = chunked::read_chunked(&mut self.connection.data, response_length as usize)
            .map_err(RpcError::transport(Phase::ReadResponse))?;

        frame::decode(&response).map_err(RpcError::encoding(Phase::DecodeResponse))
    }

    /// Call `method` with `params` and return its result
    ///
    /// Device-side failures come back as [`RpcError::Application`].
    ///
    /// # Example
    /// ```ignore
    /// let status = client.call("Switch.GetStatus", json!({"id": 0}))?;
    /// ```
    pub fn call(&mut self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request = RequestFrame::new(self.ids.next_id(), self.source.as_str(), method, params);
        let response = self.roundtrip(&request)?;

        if response.id != request.id {
            warn!(
                "dropping response {} to request {} ({})",
                response.id, request.id, method
            );
            return Err(CorrelationError::Id {
                expected: request.id,
                actual: response.id,
            }
            .into());
        }
        if response.destination != self.source {
            warn!(
                "dropping response addressed to {:?} ({})",
                response.destination, method
            );
            return Err(CorrelationError::Destination {
                expected: self.source.clone(),
                actual: response.destination,
            }
            .into());
        }

        if let Some(envelope) = response.error {
            debug!("request {} ({}) failed on device: {}", request.id, method, envelope);
            return Err(envelope.into());
        }
        Ok(response.result)
    }

    /// [`call`](Self::call) with typed params and result
    pub fn call_as<P, R>(&mut self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(RpcError::encoding(Phase::EncodeParams))?;
        let result = self.call(method, params)?;
        serde_json::from_value(result).map_err(RpcError::encoding(Phase::DecodeResult))
    }
}
