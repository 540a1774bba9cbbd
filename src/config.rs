//! Connection configuration
//!
//! Every knob has a well-known default. Callers override any of them
//! independently; [`resolve`] picks the override when one is present. The
//! defaults are resolved once, when a connection is set up.

use core::fmt;
use core::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use crate::transport::ConnectionError;

// ============================================================================
// Defaults
// ============================================================================

// UUIDs as published in the Shelly BLE RPC documentation
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f53_56435f49445f);
pub const DEFAULT_DATA_UUID: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f64_6174615f5f5f);
pub const DEFAULT_TX_CTL_UUID: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f74_785f63746c5f);
pub const DEFAULT_RX_CTL_UUID: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f72_785f63746c5f);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// ATT payload of the minimum BLE MTU (23 bytes minus the 3 byte header)
pub const DEFAULT_MTU: usize = 20;

/// Use `value` when set, `fallback` otherwise
pub fn resolve<T>(value: Option<T>, fallback: T) -> T {
    value.unwrap_or(fallback)
}

// ============================================================================
// GATT profile
// ============================================================================

/// Fully resolved service and characteristic UUIDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattProfile {
    pub service: Uuid,
    /// Request and response payload bytes
    pub data: Uuid,
    /// Length of the request about to be written
    pub tx_ctl: Uuid,
    /// Length of the pending response
    pub rx_ctl: Uuid,
}

impl Default for GattProfile {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE_UUID,
            data: DEFAULT_DATA_UUID,
            tx_ctl: DEFAULT_TX_CTL_UUID,
            rx_ctl: DEFAULT_RX_CTL_UUID,
        }
    }
}

// ============================================================================
// Device address
// ============================================================================

/// 48-bit Bluetooth device address, most significant octet first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = ConnectionError;

    /// Parse `AA:BB:CC:DD:EE:FF` (case-insensitive, `-` also accepted)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ConnectionError::InvalidAddress {
            address: s.to_string(),
            reason,
        };

        let upper = s.trim().to_ascii_uppercase();
        let mut octets = [0u8; 6];
        let mut parts = upper.split([':', '-']);
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| invalid("expected 6 octets"))?;
            if part.len() != 2 {
                return Err(invalid("each octet must be two hex digits"));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid("invalid hex digit"))?;
        }
        if parts.next().is_some() {
            return Err(invalid("expected 6 octets"));
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

// ============================================================================
// Setup options
// ============================================================================

/// Everything a [`ConnectionManager`](crate::ConnectionManager) needs to reach
/// a device
///
/// Only the address is mandatory.
///
/// # Example
/// ```
/// use shelly_rpc::config::SetupOptions;
/// use std::time::Duration;
///
/// let options = SetupOptions::new("f8:44:77:21:12:55")
///     .connect_timeout(Duration::from_secs(30))
///     .mtu(244);
/// assert_eq!(options.resolved_mtu(), 244);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupOptions {
    pub address: String,
    /// Local adapter name, e.g. `hci1`; the first adapter when unset
    pub adapter: Option<String>,
    pub service_uuid: Option<Uuid>,
    pub data_uuid: Option<Uuid>,
    pub tx_ctl_uuid: Option<Uuid>,
    pub rx_ctl_uuid: Option<Uuid>,
    /// Bound on discovering and connecting to the device
    pub connect_timeout: Option<Duration>,
    /// Bound on every other operation
    pub timeout: Option<Duration>,
    /// Negotiated payload size, for stacks that do not report one
    pub mtu: Option<usize>,
}

impl SetupOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    pub fn service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuid = Some(uuid);
        self
    }

    pub fn data_uuid(mut self, uuid: Uuid) -> Self {
        self.data_uuid = Some(uuid);
        self
    }

    pub fn tx_ctl_uuid(mut self, uuid: Uuid) -> Self {
        self.tx_ctl_uuid = Some(uuid);
        self
    }

    pub fn rx_ctl_uuid(mut self, uuid: Uuid) -> Self {
        self.rx_ctl_uuid = Some(uuid);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = Some(mtu);
        self
    }

    /// Parse the configured address
    pub fn mac_address(&self) -> Result<MacAddress, ConnectionError> {
        if self.address.trim().is_empty() {
            return Err(ConnectionError::MissingAddress);
        }
        self.address.parse()
    }

    pub fn gatt_profile(&self) -> GattProfile {
        GattProfile {
            service: resolve(self.service_uuid, DEFAULT_SERVICE_UUID),
            data: resolve(self.data_uuid, DEFAULT_DATA_UUID),
            tx_ctl: resolve(self.tx_ctl_uuid, DEFAULT_TX_CTL_UUID),
            rx_ctl: resolve(self.rx_ctl_uuid, DEFAULT_RX_CTL_UUID),
        }
    }

    pub fn resolved_connect_timeout(&self) -> Duration {
        resolve(self.connect_timeout, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn resolved_timeout(&self) -> Duration {
        resolve(self.timeout, DEFAULT_TIMEOUT)
    }

    pub fn resolved_mtu(&self) -> usize {
        resolve(self.mtu, DEFAULT_MTU)
    }
}
