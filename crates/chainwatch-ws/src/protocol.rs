//! Inbound message model for the logs feed.

use serde::Deserialize;
use serde_json::Value;

use chainwatch_core::request::{JsonRpcError, SUBSCRIBE_REQUEST_ID};

/// `{"method":"logsNotification","params":{"result":{"value":{...}}}}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogsNotification {
    pub params: NotificationParams,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationParams {
    #[serde(default)]
    pub subscription: Option<u64>,
    pub result: NotificationResult,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationResult {
    #[serde(default)]
    pub context: Option<NotificationContext>,
    pub value: LogsValue,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationContext {
    pub slot: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogsValue {
    pub signature: String,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub logs: Option<Vec<String>>,
}

impl LogsNotification {
    pub fn signature(&self) -> &str {
        &self.params.result.value.signature
    }

    /// Log lines; an absent array reads as empty.
    pub fn logs(&self) -> &[String] {
        self.params.result.value.logs.as_deref().unwrap_or(&[])
    }

    pub fn slot(&self) -> Option<u64> {
        self.params.result.context.as_ref().map(|c| c.slot)
    }
}

/// One classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Ack of the `logsSubscribe` request; carries the handle.
    SubscribeAck { handle: u64 },
    Notification(LogsNotification),
    /// Error object from the node, tagged with its correlation id if any.
    Error { id: Option<u64>, error: JsonRpcError },
    /// Anything else (other acks, unknown methods, malformed notifications).
    Other,
}

/// Classify a text frame. Only invalid JSON is an error; well-formed but
/// unexpected shapes come back as [`Inbound::Other`].
pub fn classify(text: &str) -> Result<Inbound, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;

    if value.get("method").and_then(Value::as_str) == Some("logsNotification") {
        return Ok(match serde_json::from_value::<LogsNotification>(value) {
            Ok(notification) => Inbound::Notification(notification),
            Err(_) => Inbound::Other,
        });
    }

    let id = value.get("id").and_then(Value::as_u64);

    if let Some(error) = value.get("error") {
        return Ok(match serde_json::from_value::<JsonRpcError>(error.clone()) {
            Ok(error) => Inbound::Error { id, error },
            Err(_) => Inbound::Other,
        });
    }

    if id == Some(SUBSCRIBE_REQUEST_ID) {
        if let Some(handle) = value.get("result").and_then(Value::as_u64) {
            return Ok(Inbound::SubscribeAck { handle });
        }
    }

    Ok(Inbound::Other)
}
