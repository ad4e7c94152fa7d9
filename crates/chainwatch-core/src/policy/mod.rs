//! Retry policy shared by the reconnect loop and the detail fetcher.
//!
//! ```text
//! stream closed  → [Backoff (reconnect budget)] → connect again
//! fetch missed   → [Backoff (attempt budget)]   → fetch again
//! ```

pub mod retry;

pub use retry::{Backoff, RetryConfig, RetryPolicy};
