//! chainwatch-ws — `logsSubscribe` client with a reconnect budget.
//!
//! # Features
//! - One subscription per connection, re-issued after every reconnect
//! - Capped ×1.5 reconnect backoff, reset whenever the stream opens;
//!   exhausting the budget is terminal
//! - Relevance filtering on log text before any detail fetch
//! - Concurrent, unordered enrichment of relevant notifications
//! - Graceful shutdown: `logsUnsubscribe`, close, no reconnect

pub mod filter;
pub mod protocol;
pub mod subscriber;

pub use filter::RelevanceFilter;
pub use protocol::{Inbound, LogsNotification};
pub use subscriber::{ConnectionState, StreamSubscriber, Subscription};
