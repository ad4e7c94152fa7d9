//! `DetailFetcher` — bounded-retry enrichment of a signature.
//!
//! ```text
//! fetch(sig)
//!   → sleep(initial_delay)                      once, unconditionally
//!   → strategy.fetch_once(sig)                  attempt 1
//!   → miss/error: sleep(2000) → attempt 2
//!   → miss/error: sleep(3000) → attempt 3
//!   → miss/error: give up, None
//! ```
//!
//! Every call builds its own [`Backoff`]; there is no state shared across
//! signatures, so a run of failures for one never delays another.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use chainwatch_core::config::FetchConfig;
use chainwatch_core::handler::TransactionFetcher;
use chainwatch_core::policy::{Backoff, RetryConfig};
use chainwatch_core::record::TransactionRecord;

use crate::strategy::FetchStrategy;

pub struct DetailFetcher {
    strategy: Arc<dyn FetchStrategy>,
    initial_delay: Duration,
    retry: RetryConfig,
}

impl DetailFetcher {
    pub fn new(strategy: Arc<dyn FetchStrategy>, config: &FetchConfig) -> Self {
        Self {
            strategy,
            initial_delay: config.initial_delay,
            retry: config.retry(),
        }
    }

    /// Fetch `signature`, absorbing every failure. `None` once all attempts
    /// are spent.
    pub async fn fetch(&self, signature: &str) -> Option<TransactionRecord> {
        tokio::time::sleep(self.initial_delay).await;

        let mut backoff = Backoff::new(self.retry.clone());
        loop {
            let attempt = backoff.attempts() + 1;
            match self.strategy.fetch_once(signature).await {
                Ok(Some(record)) => {
                    tracing::debug!(%signature, attempt, strategy = self.strategy.name(), "transaction fetched");
                    return Some(record);
                }
                Ok(None) => {
                    tracing::debug!(%signature, attempt, "transaction not available yet");
                }
                Err(e) => {
                    tracing::warn!(%signature, attempt, error = %e, "fetch attempt failed");
                }
            }

            match backoff.next_delay() {
                Some(delay) => {
                    tracing::debug!(%signature, attempt, delay_ms = delay.as_millis() as u64, "retrying fetch");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(%signature, attempts = attempt, "enrichment failed permanently");
                    return None;
                }
            }
        }
    }
}

#[async_trait]
impl TransactionFetcher for DetailFetcher {
    async fn fetch(&self, signature: &str) -> Option<TransactionRecord> {
        DetailFetcher::fetch(self, signature).await
    }
}
