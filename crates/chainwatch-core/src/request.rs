//! JSON-RPC 2.0 wire types and the Solana requests ChainWatch sends.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Correlation id of the `logsSubscribe` request; its ack carries the
/// subscription handle.
pub const SUBSCRIBE_REQUEST_ID: u64 = 1;

/// Correlation id of the `logsUnsubscribe` request sent during shutdown.
pub const UNSUBSCRIBE_REQUEST_ID: u64 = 999;

/// Commitment level used for both the subscription and detail fetches.
pub const COMMITMENT: &str = "confirmed";

/// JSON-RPC request ID — string, number, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
    Null,
}

impl RpcId {
    /// Numeric id, if this is one.
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RpcId,
    pub method: String,
    pub params: Vec<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: RpcId::Number(id),
            method: method.into(),
            params,
        }
    }

    /// `logsSubscribe` for every transaction mentioning `address`.
    pub fn logs_subscribe(address: &str) -> Self {
        Self::new(
            SUBSCRIBE_REQUEST_ID,
            "logsSubscribe",
            vec![
                json!({ "mentions": [address] }),
                json!({ "commitment": COMMITMENT, "encoding": "jsonParsed" }),
            ],
        )
    }

    /// `logsUnsubscribe` for a previously acknowledged handle.
    pub fn logs_unsubscribe(handle: u64) -> Self {
        Self::new(UNSUBSCRIBE_REQUEST_ID, "logsUnsubscribe", vec![json!(handle)])
    }

    /// `getTransaction` in `json` encoding, so instructions reference
    /// account indices.
    pub fn get_transaction(id: u64, signature: &str) -> Self {
        Self::new(
            id,
            "getTransaction",
            vec![
                json!(signature),
                json!({
                    "encoding": "json",
                    "commitment": COMMITMENT,
                    "maxSupportedTransactionVersion": 0
                }),
            ],
        )
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default = "null_id")]
    pub id: RpcId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn null_id() -> RpcId {
    RpcId::Null
}

impl JsonRpcResponse {
    /// Unwrap the result value or return the node's error.
    ///
    /// A missing `result` comes back as `Value::Null`, which for
    /// `getTransaction` means "not available yet".
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_request_shape() {
        let req = JsonRpcRequest::logs_subscribe("Watched111");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["id"], 1);
        assert_eq!(v["method"], "logsSubscribe");
        assert_eq!(v["params"][0]["mentions"][0], "Watched111");
        assert_eq!(v["params"][1]["commitment"], "confirmed");
        assert_eq!(v["params"][1]["encoding"], "jsonParsed");
    }

    #[test]
    fn unsubscribe_request_uses_handle() {
        let v = serde_json::to_value(JsonRpcRequest::logs_unsubscribe(4242)).unwrap();
        assert_eq!(v["id"], 999);
        assert_eq!(v["method"], "logsUnsubscribe");
        assert_eq!(v["params"], json!([4242]));
    }

    #[test]
    fn get_transaction_requests_index_encoding() {
        let v = serde_json::to_value(JsonRpcRequest::get_transaction(7, "sig")).unwrap();
        assert_eq!(v["params"][0], "sig");
        assert_eq!(v["params"][1]["encoding"], "json");
        assert_eq!(v["params"][1]["maxSupportedTransactionVersion"], 0);
    }

    #[test]
    fn null_result_reads_as_null() {
        let resp: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(resp.id.as_number(), Some(1));
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn error_response_surfaces_code() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid param"}}"#,
        )
        .unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, -32602);
    }
}
