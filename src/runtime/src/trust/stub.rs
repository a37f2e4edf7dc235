//! Deterministic trust capability for tests and dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use imgauthz_core::error::{AuthzError, Result};
use parking_lot::Mutex;

use super::capability::{LookupOutput, LookupRequest, TrustCapability};

/// Scripted lookup result.
#[derive(Debug, Clone)]
enum StubOutcome {
    Exit { success: bool, output: String },
    Error(String),
}

/// A [`TrustCapability`] that returns a fixed outcome and records its calls.
pub struct StubCapability {
    outcome: StubOutcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<LookupRequest>>,
}

impl StubCapability {
    fn with_outcome(outcome: StubOutcome) -> Self {
        Self {
            outcome,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every lookup exits zero.
    pub fn passing() -> Self {
        Self::with_outcome(StubOutcome::Exit {
            success: true,
            output: String::new(),
        })
    }

    /// Every lookup exits non-zero with `output`.
    pub fn failing(output: impl Into<String>) -> Self {
        Self::with_outcome(StubOutcome::Exit {
            success: false,
            output: output.into(),
        })
    }

    /// Every lookup fails to run at all.
    pub fn erroring(message: impl Into<String>) -> Self {
        Self::with_outcome(StubOutcome::Error(message.into()))
    }

    /// Sleep before answering, to hold a verification in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of lookups started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<LookupRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TrustCapability for StubCapability {
    async fn lookup(&self, request: &LookupRequest) -> Result<LookupOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            StubOutcome::Exit { success, output } => Ok(LookupOutput {
                success: *success,
                output: output.clone(),
            }),
            StubOutcome::Error(message) => Err(AuthzError::VerificationFailure(message.clone())),
        }
    }
}
