//! Runtime configuration.
//!
//! Every field has a default; the binary overrides them from the
//! environment. `validate()` performs the semantic checks serde cannot.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::RetryConfig;
use crate::policy::retry::millis;
use crate::telemetry::LogConfig;

/// Placeholder substituted with the API key in endpoint URLs.
pub const API_KEY_PLACEHOLDER: &str = "{api_key}";

/// Raydium AMM v4.
pub const DEFAULT_WATCH_ADDRESS: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

pub const DEFAULT_PROGRAM_IDS: &[&str] = &[
    // Raydium AMM v4
    "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
    // Raydium CLMM
    "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK",
    // Raydium CPMM
    "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C",
    // Orca Whirlpool
    "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc",
    // Jupiter v6
    "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
    // Meteora DLMM
    "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo",
];

/// Which notifications trigger a detail fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevancePolicy {
    /// Match log text against swap/pool keywords, program ids and the
    /// watched address.
    #[default]
    LogContent,
    /// Every notification with a signature is relevant; the node's
    /// `mentions` filter is trusted entirely.
    AnySignature,
}

impl std::str::FromStr for RelevancePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "logs" | "log_content" => Ok(Self::LogContent),
            "any" | "any_signature" => Ok(Self::AnySignature),
            other => Err(ConfigError::Invalid {
                var: "RELEVANCE_POLICY",
                reason: format!("expected 'logs' or 'any', got '{other}'"),
            }),
        }
    }
}

/// Shape of the detail endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategyKind {
    /// One JSON-RPC `getTransaction` per signature.
    #[default]
    Rpc,
    /// POST a JSON-RPC batch of `getTransaction` calls; the endpoint answers
    /// with an array of responses.
    Bulk,
}

impl std::str::FromStr for FetchStrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rpc" => Ok(Self::Rpc),
            "bulk" => Ok(Self::Bulk),
            other => Err(ConfigError::Invalid {
                var: "FETCH_STRATEGY",
                reason: format!("expected 'rpc' or 'bulk', got '{other}'"),
            }),
        }
    }
}

/// Node endpoints and the credential they need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub api_key: String,
    pub ws_url: String,
    pub rpc_url: String,
    pub bulk_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            ws_url: "wss://mainnet.helius-rpc.com/?api-key={api_key}".into(),
            rpc_url: "https://mainnet.helius-rpc.com/?api-key={api_key}".into(),
            bulk_url: "https://mainnet.helius-rpc.com/?api-key={api_key}".into(),
        }
    }
}

impl EndpointConfig {
    fn resolve(&self, url: &str) -> String {
        url.replace(API_KEY_PLACEHOLDER, &self.api_key)
    }

    pub fn ws_url(&self) -> String {
        self.resolve(&self.ws_url)
    }

    pub fn rpc_url(&self) -> String {
        self.resolve(&self.rpc_url)
    }

    pub fn bulk_url(&self) -> String {
        self.resolve(&self.bulk_url)
    }

    fn needs_api_key(&self) -> bool {
        [&self.ws_url, &self.rpc_url, &self.bulk_url]
            .iter()
            .any(|u| u.contains(API_KEY_PLACEHOLDER))
    }
}

/// What to subscribe to and which notifications matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub watch_address: String,
    pub program_ids: Vec<String>,
    pub relevance: RelevancePolicy,
    #[serde(with = "millis")]
    pub heartbeat_interval: Duration,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            watch_address: DEFAULT_WATCH_ADDRESS.into(),
            program_ids: DEFAULT_PROGRAM_IDS.iter().map(|s| s.to_string()).collect(),
            relevance: RelevancePolicy::default(),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Reconnect budget for the stream: 10 attempts, 1s growing ×1.5 to 30s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub retry: RetryConfig,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig {
                max_retries: 10,
                initial_backoff: Duration::from_millis(1_000),
                max_backoff: Duration::from_millis(30_000),
                multiplier: 1.5,
            },
        }
    }
}

/// Detail fetch behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub strategy: FetchStrategyKind,
    /// Waited once before the first call; the feed runs ahead of storage.
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Total calls per signature, including the first.
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub retry_initial: Duration,
    #[serde(with = "millis")]
    pub retry_max: Duration,
    pub multiplier: f64,
    #[serde(with = "millis")]
    pub request_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            strategy: FetchStrategyKind::default(),
            initial_delay: Duration::from_millis(1_000),
            max_attempts: 3,
            retry_initial: Duration::from_millis(2_000),
            retry_max: Duration::from_millis(10_000),
            multiplier: 1.5,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl FetchConfig {
    /// Retry schedule between attempts: `max_attempts - 1` retries.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_attempts.saturating_sub(1),
            initial_backoff: self.retry_initial,
            max_backoff: self.retry_max,
            multiplier: self.multiplier,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub endpoints: EndpointConfig,
    pub subscription: SubscriptionConfig,
    pub reconnect: ReconnectConfig,
    pub fetch: FetchConfig,
    pub log: LogConfig,
    /// Time given to the close frame to flush before the process exits.
    #[serde(with = "millis")]
    pub shutdown_grace: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            endpoints: EndpointConfig::default(),
            subscription: SubscriptionConfig::default(),
            reconnect: ReconnectConfig::default(),
            fetch: FetchConfig::default(),
            log: LogConfig::default(),
            shutdown_grace: Duration::from_millis(1_000),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.api_key.trim().is_empty() && self.endpoints.needs_api_key() {
            return Err(ConfigError::Missing("HELIUS_API_KEY"));
        }
        if self.subscription.watch_address.trim().is_empty() {
            return Err(ConfigError::Missing("WATCH_ADDRESS"));
        }
        if self.subscription.heartbeat_interval.is_zero() {
            return Err(invalid("HEARTBEAT_INTERVAL_MS", "must be greater than zero"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(invalid("FETCH_MAX_ATTEMPTS", "must be at least 1"));
        }
        if self.fetch.retry_initial > self.fetch.retry_max {
            return Err(invalid("FETCH_RETRY_INITIAL_MS", "exceeds FETCH_RETRY_MAX_MS"));
        }
        let reconnect = &self.reconnect.retry;
        if reconnect.initial_backoff > reconnect.max_backoff {
            return Err(invalid("RECONNECT_INITIAL_MS", "exceeds RECONNECT_MAX_MS"));
        }
        if self.fetch.multiplier < 1.0 || reconnect.multiplier < 1.0 {
            return Err(invalid("multiplier", "must be >= 1.0"));
        }
        self.log.filter()?;
        Ok(())
    }
}

fn invalid(var: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.to_string(),
    }
}
