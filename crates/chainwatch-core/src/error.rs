//! Error types shared across the ChainWatch crates.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors from one HTTP round trip to a node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, timeout, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Map a `reqwest`-style error string plus timeout flag into a variant.
    pub fn from_http(message: impl Into<String>, timed_out: bool, timeout_ms: u64) -> Self {
        if timed_out {
            Self::Timeout { ms: timeout_ms }
        } else {
            Self::Http(message.into())
        }
    }
}

/// Invalid or missing configuration, detected at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Terminal outcomes of the stream subscriber.
#[derive(Debug, Error)]
pub enum SubscriberError {
    /// Every reconnect attempt in the budget failed; the process should exit
    /// with a non-zero status.
    #[error("reconnect budget exhausted after {attempts} attempts")]
    ReconnectBudgetExhausted { attempts: u32 },

    #[error("invalid stream URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}
