//! Shelly RPC frame format
//!
//! Requests and responses travel as UTF-8 JSON objects. The byte length of
//! each object is announced separately on the control characteristics.
//!
//! ```text
//! request:  {"id": <u64>, "src": <string>, "method": <string>, "params": <json>}
//! response: {"id": <u64>, "dst": <string>, "result": <json>}
//!       or: {"id": <u64>, "dst": <string>, "error": {"code": <int>, "message": <string>}}
//! ```
//!
//! The response `id` echoes the request `id` and `dst` echoes the request
//! `src`; that pair is how a caller ties a response to its request.
//!
//! Decoding is lenient: unknown fields are ignored and missing fields take
//! their zero value. Only structurally invalid JSON is an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Source identifier this client puts in every request
pub const SOURCE_NAME: &str = "shelly-rpc-rs";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestFrame {
    pub id: u64,
    #[serde(rename = "src")]
    pub source: String,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseFrame {
    pub id: u64,
    #[serde(rename = "dst")]
    pub destination: String,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

/// Failure reported by the device for an otherwise well-formed call
///
/// Codes follow JSON-RPC conventions, e.g. `-32601` for an unknown method,
/// plus device specific ones such as `-103` for invalid arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(default)]
#[error("device returned error {code}: {message}")]
pub struct ErrorEnvelope {
    pub code: i64,
    pub message: String,
}

impl RequestFrame {
    pub fn new(id: u64, source: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            source: source.into(),
            method: method.into(),
            params,
        }
    }
}

impl ResponseFrame {
    /// Successful response to `request`
    pub fn reply(request: &RequestFrame, result: Value) -> Self {
        Self {
            id: request.id,
            destination: request.source.clone(),
            result,
            error: None,
        }
    }

    /// Error response to `request`
    pub fn failure(request: &RequestFrame, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: request.id,
            destination: request.source.clone(),
            result: Value::Null,
            error: Some(ErrorEnvelope {
                code,
                message: message.into(),
            }),
        }
    }
}

pub fn encode(request: &RequestFrame) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(request)
}

pub fn decode(bytes: &[u8]) -> Result<ResponseFrame, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Device side of [`encode`]
pub fn decode_request(bytes: &[u8]) -> Result<RequestFrame, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Device side of [`decode`]
pub fn encode_response(response: &ResponseFrame) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn representative_params() -> Vec<Value> {
        vec![
            Value::Null,
            json!({"a": 1, "b": [1, 2, 3]}),
            json!({"l1": {"l2": {"l3": {"l4": [{"x": 1.5}, null, true, "s"]}}}}),
            json!("bare string"),
        ]
    }

    #[test]
    fn request_wire_shape() {
        let req = RequestFrame::new(7, SOURCE_NAME, "Shelly.GetConfig", Value::Null);
        let bytes = encode(&req).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"id":7,"src":"shelly-rpc-rs","method":"Shelly.GetConfig","params":null}"#
        );
    }

    #[test]
    fn request_preserves_params() {
        for params in representative_params() {
            let req = RequestFrame::new(u64::MAX, "src", "Test.Echo", params);
            let decoded = decode_request(&encode(&req).unwrap()).unwrap();
            assert_eq!(decoded, req);
        }
    }

    #[test]
    fn response_preserves_result() {
        let req = RequestFrame::new(42, "src", "Test.Echo", Value::Null);
        for result in representative_params() {
            let res = ResponseFrame::reply(&req, result);
            let decoded = decode(&encode_response(&res).unwrap()).unwrap();
            assert_eq!(decoded, res);
        }
    }

    #[test]
    fn integer_and_float_stay_distinct() {
        let res = decode(br#"{"id":1,"dst":"x","result":{"i":3,"f":3.0}}"#).unwrap();
        assert!(res.result["i"].is_u64());
        assert!(res.result["f"].is_f64());
    }

    #[test]
    fn object_key_order_is_kept() {
        let res = decode(br#"{"id":1,"dst":"x","result":{"z":1,"a":2,"m":3}}"#).unwrap();
        let keys: Vec<&str> = res
            .result
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn missing_and_unknown_fields_default() {
        let res = decode(br#"{"src":"device","extra":[1,2]}"#).unwrap();
        assert_eq!(res, ResponseFrame::default());
    }

    #[test]
    fn error_member_is_decoded() {
        let res = decode(
            br#"{"id":9,"src":"shellyblutrv","dst":"me","error":{"code":-32601,"message":"No handler for Foo.Bar"}}"#,
        )
        .unwrap();
        assert_eq!(res.id, 9);
        assert_eq!(res.result, Value::Null);
        assert_eq!(
            res.error,
            Some(ErrorEnvelope {
                code: -32601,
                message: "No handler for Foo.Bar".into(),
            })
        );
    }

    #[test]
    fn malformed_json_fails() {
        assert!(decode(b"{\"id\":1,").is_err());
        assert!(decode(b"").is_err());
        assert!(decode(b"\xff\xfe").is_err());
    }
}
