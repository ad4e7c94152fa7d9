//! chainwatch-core — foundation types for ChainWatch.
//!
//! # Overview
//!
//! ChainWatch follows a single account's log feed on a Solana node, pulls the
//! full transaction behind every relevant notification and hands it to an
//! analyzer. The core crate defines:
//!
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`] — wire types and the request
//!   constructors for `logsSubscribe`, `logsUnsubscribe` and `getTransaction`
//! - [`wire`] — serde model of a `getTransaction` result
//! - [`TransactionRecord`] — the enriched, immutable transaction
//! - [`analysis`] — SOL / token balance deltas and program matching
//! - [`policy`] module — capped exponential backoff shared by reconnect and
//!   fetch retry
//! - [`TransactionFetcher`] / [`TransactionAnalyzer`] — the seams between the
//!   subscriber, the fetcher and the console
//! - [`WatchConfig`] — every tunable with its default

pub mod analysis;
pub mod config;
pub mod error;
pub mod handler;
pub mod policy;
pub mod record;
pub mod request;
pub mod telemetry;
pub mod wire;

pub use analysis::TransactionAnalysis;
pub use config::{
    EndpointConfig, FetchConfig, FetchStrategyKind, ReconnectConfig, RelevancePolicy,
    SubscriptionConfig, WatchConfig,
};
pub use error::{ConfigError, SubscriberError, TransportError};
pub use handler::{TransactionAnalyzer, TransactionFetcher};
pub use record::{CompiledInstruction, TokenBalance, TransactionRecord};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use telemetry::{init_tracing, LogConfig};
