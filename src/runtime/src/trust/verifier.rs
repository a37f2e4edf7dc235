//! Content trust verification.
//!
//! Turns a canonical image reference into a lookup against the configured
//! trust server. Concurrent verifications of the same reference are
//! collapsed: while one is running, later callers are let through without
//! a second external call. This keeps a verification that itself pulls the
//! image from deadlocking on its own request, at the price of letting a
//! concurrent request for an image that is about to fail verification pass.

use std::path::Path;
use std::sync::Arc;

use imgauthz_core::error::{AuthzError, Result};
use imgauthz_core::TrustPolicy;

use super::capability::{LookupRequest, TrustCapability};
use super::inflight::InFlightVerifications;
use super::redact::redact_diagnostic;
use crate::oci::ImageReference;

/// Successful outcome of [`TrustVerifier::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The verifier accepted the signed tag.
    Verified,
    /// Another request is verifying the same reference right now.
    InFlight,
}

/// Runs content trust lookups for canonical image references.
pub struct TrustVerifier {
    policy: TrustPolicy,
    capability: Arc<dyn TrustCapability>,
    in_flight: InFlightVerifications,
}

impl TrustVerifier {
    pub fn new(policy: TrustPolicy, capability: Arc<dyn TrustCapability>) -> Self {
        Self {
            policy,
            capability,
            in_flight: InFlightVerifications::new(),
        }
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    pub fn in_flight(&self) -> &InFlightVerifications {
        &self.in_flight
    }

    /// Verify the signed tag of `canonical`.
    ///
    /// Errors carry the reason to report: `VerificationFailure` with the
    /// (possibly redacted) verifier output, `VerificationTimeout`,
    /// `ConfigError` without a trust server, or `ParseError`.
    pub async fn verify(&self, canonical: &str) -> Result<VerifyOutcome> {
        let server = self.policy.server.as_deref().ok_or_else(|| {
            AuthzError::ConfigError("No authorized notaries configured".to_string())
        })?;

        let reference = ImageReference::parse(canonical)?;
        let key = reference.canonical();

        let Some(_guard) = self.in_flight.try_begin(&key) else {
            tracing::info!(reference = %key, "Verification already in progress, allowing");
            return Ok(VerifyOutcome::InFlight);
        };

        let request = LookupRequest {
            server: server.to_string(),
            trust_dir: self.policy.trust_dir.clone(),
            root_ca: self.policy.root_ca.clone(),
            gun: reference.gun(),
            tag: reference.tag.clone(),
        };

        tracing::info!(
            reference = %key,
            server = %server,
            "Enforcing content trust"
        );

        let timeout = self.policy.timeout();
        match tokio::time::timeout(timeout, self.capability.lookup(&request)).await {
            Ok(Ok(output)) if output.success => {
                tracing::debug!(reference = %key, "Content trust verified");
                Ok(VerifyOutcome::Verified)
            }
            Ok(Ok(output)) => {
                tracing::warn!(reference = %key, output = %output.output.trim(), "Content trust lookup failed");
                Err(AuthzError::VerificationFailure(self.diagnostic(&output.output)))
            }
            Ok(Err(AuthzError::VerificationFailure(message))) => {
                tracing::warn!(reference = %key, error = %message, "Content trust lookup did not run");
                Err(AuthzError::VerificationFailure(self.diagnostic(&message)))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(
                    reference = %key,
                    timeout_secs = timeout.as_secs(),
                    "Content trust lookup timed out"
                );
                Err(AuthzError::VerificationTimeout {
                    reference: key.clone(),
                    secs: timeout.as_secs(),
                })
            }
        }
    }

    fn diagnostic(&self, output: &str) -> String {
        if !self.policy.redact_diagnostics {
            return output.trim().to_string();
        }
        let mut local_paths: Vec<&Path> = vec![self.policy.trust_dir.as_path()];
        if let Some(ref ca) = self.policy.root_ca {
            local_paths.push(ca.as_path());
        }
        redact_diagnostic(output, &local_paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::{NotaryCli, StubCapability};
    use std::path::PathBuf;
    use tempfile::TempDir;
    use std::time::Duration;

    fn policy() -> TrustPolicy {
        TrustPolicy {
            server: Some("https://notary.local:4443".to_string()),
            root_ca: Some(PathBuf::from("/root/.docker/tls/notary.local:4443/root-ca.crt")),
            ..TrustPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_verify_builds_gun_and_tag() {
        let stub = Arc::new(StubCapability::passing());
        let verifier = TrustVerifier::new(policy(), stub.clone());

        let outcome = verifier.verify("docker.io/ubuntu").await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].gun, "docker.io/library/ubuntu");
        assert_eq!(requests[0].tag, "latest");
        assert_eq!(requests[0].server, "https://notary.local:4443");
        assert!(requests[0].root_ca.is_some());
        assert!(verifier.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_verify_failure_carries_diagnostic() {
        let stub = Arc::new(StubCapability::failing("no trust data\n"));
        let verifier = TrustVerifier::new(policy(), stub.clone());

        let err = verifier.verify("docker.io/ubuntu:22.04").await.unwrap_err();
        match err {
            AuthzError::VerificationFailure(msg) => assert_eq!(msg, "no trust data"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(stub.requests()[0].tag, "22.04");
        assert!(verifier.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_verify_redacts_local_paths() {
        let stub = Arc::new(StubCapability::failing(
            "x509: certificate signed by unknown authority (/root/.docker/tls/notary.local:4443/root-ca.crt)",
        ));
        let verifier = TrustVerifier::new(policy(), stub);

        let err = verifier.verify("docker.io/ubuntu").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("<redacted>"));
        assert!(!msg.contains("root-ca.crt"));
    }

    #[tokio::test]
    async fn test_verify_without_redaction() {
        let stub = Arc::new(StubCapability::failing("bad /root/.docker/trust state"));
        let verifier = TrustVerifier::new(
            TrustPolicy {
                redact_diagnostics: false,
                ..policy()
            },
            stub,
        );
        let err = verifier.verify("docker.io/ubuntu").await.unwrap_err();
        assert!(err.to_string().contains("/root/.docker/trust"));
    }

    #[tokio::test]
    async fn test_verify_without_server_is_config_error() {
        let stub = Arc::new(StubCapability::passing());
        let verifier = TrustVerifier::new(TrustPolicy::disabled(), stub.clone());
        let err = verifier.verify("docker.io/ubuntu").await.unwrap_err();
        assert!(matches!(err, AuthzError::ConfigError(_)));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_verifications_share_one_lookup() {
        let stub = Arc::new(StubCapability::passing().with_delay(Duration::from_millis(200)));
        let verifier = TrustVerifier::new(policy(), stub.clone());

        let (first, second) = tokio::join!(
            verifier.verify("docker.io/ubuntu"),
            verifier.verify("docker.io/ubuntu:latest"),
        );
        assert_eq!(first.unwrap(), VerifyOutcome::Verified);
        assert_eq!(second.unwrap(), VerifyOutcome::InFlight);
        assert_eq!(stub.calls(), 1);
        assert!(verifier.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_sequential_verifications_each_look_up() {
        let stub = Arc::new(StubCapability::passing());
        let verifier = TrustVerifier::new(policy(), stub.clone());
        verifier.verify("docker.io/ubuntu").await.unwrap();
        verifier.verify("docker.io/ubuntu").await.unwrap();
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_verify_timeout_releases_claim() {
        let stub = Arc::new(StubCapability::passing().with_delay(Duration::from_secs(5)));
        let verifier = TrustVerifier::new(
            TrustPolicy {
                timeout_secs: 0,
                ..policy()
            },
            stub,
        );

        let err = verifier.verify("docker.io/ubuntu").await.unwrap_err();
        assert!(matches!(err, AuthzError::VerificationTimeout { .. }));
        assert!(verifier.in_flight().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_verify_timeout_kills_lookup_process() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("lookup-finished");
        let script = format!("sleep 2; touch '{}'", marker.display());
        let cli = NotaryCli::with_args("sh", ["-c", script.as_str(), "notary"]);
        let verifier = TrustVerifier::new(
            TrustPolicy {
                timeout_secs: 1,
                ..policy()
            },
            Arc::new(cli),
        );

        let err = verifier.verify("docker.io/ubuntu").await.unwrap_err();
        assert!(matches!(err, AuthzError::VerificationTimeout { .. }));
        assert!(verifier.in_flight().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_verify_rejects_unparseable_reference() {
        let verifier = TrustVerifier::new(policy(), Arc::new(StubCapability::passing()));
        let err = verifier.verify("docker.io/ubuntu@nodigest").await.unwrap_err();
        assert!(matches!(err, AuthzError::ParseError(_)));
    }
}
