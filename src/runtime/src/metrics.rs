//! Decision metrics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use imgauthz_core::Decision;

/// Decision and verification counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionSnapshot {
    /// Time since the engine was created (seconds)
    pub uptime_seconds: u64,

    /// Pre-action checks answered
    pub total_requests: u64,

    /// Requests allowed
    pub allowed: u64,

    /// Requests denied
    pub denied: u64,

    /// Decisions per final state
    pub by_state: BTreeMap<String, u64>,

    /// External trust lookups started
    pub verifications: u64,

    /// Verifications skipped because the reference was already in flight
    pub deduplicated_verifications: u64,

    /// Verifications that failed or timed out
    pub failed_verifications: u64,
}

/// How a verification ended, for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationRecord {
    Verified,
    Deduplicated,
    Failed,
}

/// Metrics collector
#[derive(Clone)]
pub struct DecisionMetrics {
    metrics: Arc<RwLock<DecisionSnapshot>>,
    start_time: chrono::DateTime<chrono::Utc>,
}

impl DecisionMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(DecisionSnapshot::default())),
            start_time: chrono::Utc::now(),
        }
    }

    /// Get current metrics
    pub async fn snapshot(&self) -> DecisionSnapshot {
        let mut metrics = self.metrics.read().await.clone();
        metrics.uptime_seconds = (chrono::Utc::now() - self.start_time)
            .num_seconds()
            .max(0) as u64;
        metrics
    }

    /// Count a pre-action decision
    pub async fn record_decision(&self, decision: &Decision) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        if decision.allow {
            metrics.allowed += 1;
        } else {
            metrics.denied += 1;
        }
        *metrics
            .by_state
            .entry(decision.state.as_str().to_string())
            .or_insert(0) += 1;
    }

    /// Count a verification outcome
    pub async fn record_verification(&self, record: VerificationRecord) {
        let mut metrics = self.metrics.write().await;
        match record {
            VerificationRecord::Verified => metrics.verifications += 1,
            VerificationRecord::Deduplicated => metrics.deduplicated_verifications += 1,
            VerificationRecord::Failed => {
                metrics.verifications += 1;
                metrics.failed_verifications += 1;
            }
        }
    }
}

impl Default for DecisionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgauthz_core::DecisionState;

    #[tokio::test]
    async fn test_snapshot_starts_empty() {
        let metrics = DecisionMetrics::new();
        let snap = metrics.snapshot().await;
        assert_eq!(snap.total_requests, 0);
        assert!(snap.by_state.is_empty());
    }

    #[tokio::test]
    async fn test_record_decisions() {
        let metrics = DecisionMetrics::new();
        metrics
            .record_decision(&Decision::allow(DecisionState::NotImageCommand))
            .await;
        metrics
            .record_decision(&Decision::deny(DecisionState::RegistryDenied, "nope"))
            .await;
        metrics
            .record_decision(&Decision::deny(DecisionState::RegistryDenied, "nope"))
            .await;

        let snap = metrics.snapshot().await;
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.allowed, 1);
        assert_eq!(snap.denied, 2);
        assert_eq!(snap.by_state.get("registry_denied"), Some(&2));
    }

    #[tokio::test]
    async fn test_record_verifications() {
        let metrics = DecisionMetrics::new();
        metrics.record_verification(VerificationRecord::Verified).await;
        metrics.record_verification(VerificationRecord::Failed).await;
        metrics.record_verification(VerificationRecord::Deduplicated).await;

        let snap = metrics.snapshot().await;
        assert_eq!(snap.verifications, 2);
        assert_eq!(snap.failed_verifications, 1);
        assert_eq!(snap.deduplicated_verifications, 1);
    }
}
