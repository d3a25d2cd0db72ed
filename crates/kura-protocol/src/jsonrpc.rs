//! Query Envelopes
//!
//! The JSON-RPC 2.0 framing the catalog query endpoint speaks, one object
//! (or batch array) per line. Method payloads stay untyped `Value`s here; the
//! query handler decodes them per method.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only version string the endpoint accepts and emits
pub const VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Unsupported jsonrpc version '{0}', only '2.0' is served")]
    Version(String),

    #[error("Request names no method")]
    NoMethod,
}

/// An incoming catalog query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// Absent for fire-and-forget calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// `contents.list`, `contents.get`, ...
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// Calls without an id get no reply line
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.jsonrpc != VERSION {
            return Err(EnvelopeError::Version(self.jsonrpc.clone()));
        }
        if self.method.trim().is_empty() {
            return Err(EnvelopeError::NoMethod);
        }
        Ok(())
    }
}

/// Reply line; exactly one of `result` and `error` is set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// Echoes the request id, `null` when it could not be read
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_wrong_version() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"1.0","id":1,"method":"contents.list"}"#).unwrap();
        assert_eq!(req.validate(), Err(EnvelopeError::Version("1.0".to_string())));
    }

    #[test]
    fn test_validate_rejects_blank_method() {
        let req: JsonRpcRequest = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":" "}"#).unwrap();
        assert_eq!(req.validate(), Err(EnvelopeError::NoMethod));
    }

    #[test]
    fn test_notification_has_no_id() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"contents.list"}"#).unwrap();
        assert!(req.is_notification());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_error_response_omits_result() {
        let resp = JsonRpcResponse::error(Value::from(7), -32601, "nope", None);
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["code"], -32601);
        assert_eq!(json["jsonrpc"], VERSION);
    }
}
