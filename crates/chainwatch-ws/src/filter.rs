//! Which notifications are worth a detail fetch.

use chainwatch_core::config::{RelevancePolicy, SubscriptionConfig};

use crate::protocol::LogsNotification;

#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    policy: RelevancePolicy,
    watch_address: String,
    program_ids: Vec<String>,
}

impl RelevanceFilter {
    pub fn new(policy: RelevancePolicy, watch_address: impl Into<String>, program_ids: Vec<String>) -> Self {
        Self {
            policy,
            watch_address: watch_address.into(),
            program_ids,
        }
    }

    pub fn from_config(config: &SubscriptionConfig) -> Self {
        Self::new(config.relevance, config.watch_address.clone(), config.program_ids.clone())
    }

    pub fn policy(&self) -> RelevancePolicy {
        self.policy
    }

    pub fn is_relevant(&self, notification: &LogsNotification) -> bool {
        match self.policy {
            RelevancePolicy::AnySignature => !notification.signature().is_empty(),
            RelevancePolicy::LogContent => self.matches_logs(notification.logs()),
        }
    }

    /// `true` if any line mentions a swap, a configured program, the watched
    /// address, or (case-insensitively) a pool or liquidity.
    pub fn matches_logs(&self, logs: &[String]) -> bool {
        logs.iter().any(|line| self.matches_line(line))
    }

    fn matches_line(&self, line: &str) -> bool {
        if line.contains("swap") {
            return true;
        }
        if self.program_ids.iter().any(|id| line.contains(id.as_str())) {
            return true;
        }
        if !self.watch_address.is_empty() && line.contains(self.watch_address.as_str()) {
            return true;
        }
        let lower = line.to_lowercase();
        lower.contains("pool") || lower.contains("liquidity")
    }
}
