//! Typed wrappers for common Shelly RPC methods
//!
//! Method names and parameters are documented per device, e.g. for the BLU
//! TRV at <https://shelly-api-docs.shelly.cloud/docs-ble/Devices/trv#rpc-commands>.
//! Anything not covered here is reachable through [`Shelly::client_mut`] and
//! [`RpcClient::call`].
//!
//! # Usage
//! ```ignore
//! use shelly_rpc::shelly::Shelly;
//!
//! let mut shelly = Shelly::new(RpcClient::new(connection));
//! let info = shelly.get_device_info()?;
//! println!("{} running {}", info.model, info.ver);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::id::{IdSource, RandomIds};
use crate::transport::Characteristic;
use crate::{Connection, RpcClient, RpcError};

// ============================================================================
// Method names
// ============================================================================

pub const GET_DEVICE_INFO: &str = "Shelly.GetDeviceInfo";
pub const GET_CONFIG: &str = "Shelly.GetConfig";
pub const GET_STATUS: &str = "Shelly.GetStatus";
pub const LIST_METHODS: &str = "Shelly.ListMethods";
pub const REBOOT: &str = "Shelly.Reboot";

// ============================================================================
// Shelly Struct
// ============================================================================

/// Shelly device client
///
/// Encapsulates an RPC client and exposes the `Shelly.*` service methods.
pub struct Shelly<C: Characteristic, I: IdSource = RandomIds> {
    client: RpcClient<C, I>,
}

impl<C: Characteristic> Shelly<C> {
    pub fn from_connection(connection: Connection<C>) -> Self {
        Self::new(RpcClient::new(connection))
    }
}

impl<C: Characteristic, I: IdSource> Shelly<C, I> {
    pub fn new(client: RpcClient<C, I>) -> Self {
        Self { client }
    }

    pub fn client_mut(&mut self) -> &mut RpcClient<C, I> {
        &mut self.client
    }

    pub fn into_client(self) -> RpcClient<C, I> {
        self.client
    }

    /// Identification and firmware details
    pub fn get_device_info(&mut self) -> Result<DeviceInfo, RpcError> {
        self.client.call_as(GET_DEVICE_INFO, &Value::Null)
    }

    /// Configuration of every component, keyed by component name
    pub fn get_config(&mut self) -> Result<Value, RpcError> {
        self.client.call(GET_CONFIG, Value::Null)
    }

    /// Status of every component, keyed by component name
    pub fn get_status(&mut self) -> Result<Value, RpcError> {
        self.client.call(GET_STATUS, Value::Null)
    }

    /// Names of all methods the device accepts
    pub fn list_methods(&mut self) -> Result<Vec<String>, RpcError> {
        let list: MethodList = self.client.call_as(LIST_METHODS, &Value::Null)?;
        Ok(list.methods)
    }

    /// Reboot the device, optionally after `delay_ms` milliseconds
    pub fn reboot(&mut self, delay_ms: Option<u32>) -> Result<(), RpcError> {
        let params = match delay_ms {
            Some(delay_ms) => json!({ "delay_ms": delay_ms }),
            None => Value::Null,
        };
        self.client.call(REBOOT, params).map(|_| ())
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Result of `Shelly.GetDeviceInfo`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub id: String,
    pub mac: String,
    pub model: String,
    #[serde(rename = "gen")]
    pub generation: u32,
    pub fw_id: String,
    pub ver: String,
    pub app: String,
    pub auth_en: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MethodList {
    methods: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_info_from_trv_response() {
        let result = json!({
            "id": "shellyblutrv-f84477211255",
            "mac": "F84477211255",
            "model": "SBTR-EU867",
            "gen": 3,
            "fw_id": "20240625-123456/v1.0.0@abcdef",
            "ver": "1.0.0",
            "app": "BluTrv",
            "auth_en": false,
            "batch": "2421"
        });
        let info: DeviceInfo = serde_json::from_value(result).unwrap();
        assert_eq!(info.generation, 3);
        assert_eq!(info.app, "BluTrv");
        assert_eq!(info.name, None);
    }
}
