//! Transport layer traits for Shelly RPC
//!
//! This module defines the GATT capability set that the RPC core consumes.
//! Users implement these traits for their Bluetooth stack (the `btleplug`
//! feature ships one); the library handles length prefixes, chunking and
//! framing on top of them.

use std::error::Error as StdError;

use thiserror::Error;
use uuid::Uuid;

use crate::config::SetupOptions;

/// Boxed error carried across the transport seam.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Error trait for characteristic implementations
pub trait TransportError: StdError + Send + Sync + 'static {}

/// A single GATT characteristic on the remote device
///
/// Every operation blocks the calling thread until the radio stack reports
/// completion. No single read or write may carry more than [`mtu`] bytes.
///
/// # Example
///
/// ```ignore
/// struct HciCharacteristic { handle: u16, link: Link }
///
/// impl Characteristic for HciCharacteristic {
///     type Error = LinkError;
///
///     fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
///         self.link.read_attr(self.handle, buffer)
///     }
///
///     fn write_without_response(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
///         self.link.write_cmd(self.handle, data)
///     }
///
///     fn mtu(&self) -> Result<usize, Self::Error> {
///         Ok(self.link.att_mtu() - 3)
///     }
/// }
/// ```
///
/// [`mtu`]: Characteristic::mtu
pub trait Characteristic {
    /// Error type for this characteristic
    type Error: TransportError;

    /// Read bytes from the characteristic into the provided buffer
    ///
    /// Returns the number of bytes read. May return fewer bytes than the
    /// buffer size, including zero, if the value is not available yet.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write bytes to the characteristic without waiting for an ATT response
    ///
    /// Returns the number of bytes the stack accepted.
    fn write_without_response(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Maximum number of bytes a single read or write may carry
    fn mtu(&self) -> Result<usize, Self::Error>;
}

/// The three characteristics of the RPC service, bound to one live link
///
/// Produced by [`ConnectionManager::setup`] and handed back to
/// [`ConnectionManager::teardown`]. The RPC core only ever borrows it through
/// an [`RpcClient`](crate::RpcClient).
#[derive(Debug)]
pub struct Connection<C> {
    pub(crate) data: C,
    pub(crate) tx_ctl: C,
    pub(crate) rx_ctl: C,
}

impl<C: Characteristic> Connection<C> {
    /// Bundle the data, TX control and RX control characteristics
    pub fn new(data: C, tx_ctl: C, rx_ctl: C) -> Self {
        Self {
            data,
            tx_ctl,
            rx_ctl,
        }
    }

    pub fn data(&self) -> &C {
        &self.data
    }

    pub fn tx_ctl(&self) -> &C {
        &self.tx_ctl
    }

    pub fn rx_ctl(&self) -> &C {
        &self.rx_ctl
    }

    /// Split into `(data, tx_ctl, rx_ctl)`
    pub fn into_parts(self) -> (C, C, C) {
        (self.data, self.tx_ctl, self.rx_ctl)
    }
}

/// Establishes and releases connections to a device
///
/// This is the seam to the platform Bluetooth stack: adapter enablement,
/// address resolution, connecting and GATT discovery all live behind it.
pub trait ConnectionManager {
    /// Characteristic handle type produced by this manager
    type Characteristic: Characteristic;

    /// Connect to the device described by `options` and discover the RPC
    /// service characteristics
    fn setup(
        &mut self,
        options: &SetupOptions,
    ) -> Result<Connection<Self::Characteristic>, ConnectionError>;

    /// Disconnect from the device
    fn teardown(
        &mut self,
        connection: Connection<Self::Characteristic>,
    ) -> Result<(), ConnectionError>;
}

/// Errors raised while setting up or tearing down a connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("address is required")]
    MissingAddress,
    #[error("parse remote address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: &'static str },
    #[error("get adapter: {0}")]
    Adapter(String),
    #[error("device {0} not found")]
    DeviceNotFound(String),
    #[error("service {0} not found on device")]
    ServiceNotFound(Uuid),
    #[error("characteristic {0} not found in service")]
    CharacteristicNotFound(Uuid),
    #[error("{context} timed out")]
    Timeout { context: &'static str },
    #[error("{context}: {source}")]
    Backend {
        context: &'static str,
        #[source]
        source: BoxError,
    },
    /// Setup failed after connecting and the cleanup disconnect failed too
    #[error("disconnect from device: {disconnect}, {source}")]
    Aborted {
        #[source]
        source: Box<ConnectionError>,
        disconnect: Box<ConnectionError>,
    },
}

impl ConnectionError {
    pub fn backend<E>(context: &'static str, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        ConnectionError::Backend {
            context,
            source: Box::new(source),
        }
    }
}
