//! Seams between the stream subscriber, the detail fetcher and the
//! analyzer.

use async_trait::async_trait;

use crate::record::TransactionRecord;

/// Turns a bare signature into a full record.
///
/// Implementations absorb every error; `None` means enrichment failed for
/// good and the notification is skipped.
#[async_trait]
pub trait TransactionFetcher: Send + Sync + 'static {
    async fn fetch(&self, signature: &str) -> Option<TransactionRecord>;
}

/// Receives each enriched record exactly once, in completion order.
pub trait TransactionAnalyzer: Send + Sync + 'static {
    fn analyze(&self, record: TransactionRecord);
}

impl<F> TransactionAnalyzer for F
where
    F: Fn(TransactionRecord) + Send + Sync + 'static,
{
    fn analyze(&self, record: TransactionRecord) {
        self(record)
    }
}
