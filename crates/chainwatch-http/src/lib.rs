//! chainwatch-http — turns transaction signatures into full records.
//!
//! # Features
//! - One pluggable [`FetchStrategy`] per process: JSON-RPC `getTransaction`
//!   or a bulk signatures POST
//! - Fixed warm-up delay before the first call (the log feed runs ahead of
//!   transaction storage)
//! - Bounded retry with capped ×1.5 backoff, fresh for every signature

pub mod fetcher;
pub mod strategy;

pub use fetcher::DetailFetcher;
pub use strategy::{build_strategy, BulkStrategy, FetchStrategy, RpcStrategy};
