//! Authorization decision engine.
//!
//! One pass per daemon command:
//!
//! ```text
//! classify ──not image──────────────────────────────▶ allow
//!    │
//! resolve ──no reference────────────────────────────▶ allow
//!    │
//! allow-list ──empty / registry not listed──────────▶ deny
//!    │
//! trust server ──none──▶ allow or deny (MissingTrustPolicy)
//!    │
//! verify ──ok / in flight──▶ allow     ──failed──▶ deny
//! ```

use std::sync::Arc;

use imgauthz_core::error::AuthzError;
use imgauthz_core::{Decision, DecisionState, MissingTrustPolicy, PluginConfig};

use crate::command::{classify, Command};
use crate::metrics::{DecisionMetrics, VerificationRecord};
use crate::oci::{resolve, Resolution};
use crate::trust::{TrustCapability, TrustVerifier, VerifyOutcome};

/// Deny message when the allow-list is empty.
pub const NO_REGISTRIES_MESSAGE: &str = "No authorized registries configured";

/// Deny message when signing is mandatory but no trust server is configured.
pub const NO_NOTARY_MESSAGE: &str = "No authorized notaries configured";

/// Decides whether daemon commands may proceed.
pub struct DecisionEngine {
    config: Arc<PluginConfig>,
    verifier: TrustVerifier,
    metrics: DecisionMetrics,
}

impl DecisionEngine {
    pub fn new(config: Arc<PluginConfig>, capability: Arc<dyn TrustCapability>) -> Self {
        let verifier = TrustVerifier::new(config.trust.clone(), capability);
        Self {
            config,
            verifier,
            metrics: DecisionMetrics::new(),
        }
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn verifier(&self) -> &TrustVerifier {
        &self.verifier
    }

    pub fn metrics(&self) -> &DecisionMetrics {
        &self.metrics
    }

    /// Pre-action check: may the daemon execute `command`?
    pub async fn authorize(&self, command: &Command) -> Decision {
        let (decision, registry) = self.decide(command).await;
        log_decision(command, registry.as_deref(), &decision);
        self.metrics.record_decision(&decision).await;
        decision
    }

    /// Post-action check on the daemon's response. Always allows.
    pub async fn authorize_response(&self, command: &Command) -> Decision {
        tracing::trace!(method = %command.method, path = %command.path, "Response allowed");
        Decision::allow(DecisionState::ResponseChecked)
    }

    /// Attribute `image` to a registry, preferring one on the allow-list.
    ///
    /// An explicit `<registry>/` prefix wins over the default-registry
    /// rewrite, so `ghcr.io/org/app` stays on `ghcr.io` even when
    /// `docker.io` is also listed.
    pub fn resolve_registry(&self, image: &str) -> Resolution {
        let registries = &self.config.registries;
        let trimmed = image.trim();
        let explicit = registries.iter().find(|allowed| {
            trimmed
                .strip_prefix(*allowed)
                .is_some_and(|rest| rest.starts_with('/'))
        });
        if let Some(allowed) = explicit {
            return resolve(image, allowed);
        }
        for allowed in registries.iter() {
            let resolution = resolve(image, allowed);
            if registries.contains(&resolution.registry) {
                return resolution;
            }
        }
        resolve(image, registries.iter().next().unwrap_or_default())
    }

    async fn decide(&self, command: &Command) -> (Decision, Option<String>) {
        let classification = classify(command);
        if !classification.is_image_command {
            return (Decision::allow(DecisionState::NotImageCommand), None);
        }

        let resolution = self.resolve_registry(&classification.image);
        if !resolution.is_registry_command {
            return (Decision::allow(DecisionState::NoRegistryFound), None);
        }

        let registries = &self.config.registries;
        if registries.is_empty() {
            return (
                Decision::deny(DecisionState::RegistryDenied, NO_REGISTRIES_MESSAGE),
                Some(resolution.registry),
            );
        }

        if !registries.contains(&resolution.registry) {
            let mismatch = AuthzError::RegistryMismatch {
                registry: resolution.registry.clone(),
                allowed: registries.describe(),
            };
            tracing::debug!(error = %mismatch, image = %classification.image, "Registry check failed");
            return (
                Decision::deny(DecisionState::RegistryDenied, deny_reason(mismatch)),
                Some(resolution.registry),
            );
        }

        let decision = self.check_trust(&resolution).await;
        (decision, Some(resolution.registry))
    }

    async fn check_trust(&self, resolution: &Resolution) -> Decision {
        let trust = &self.config.trust;
        if !trust.is_configured() {
            return match trust.on_missing {
                MissingTrustPolicy::AllowRegistryOnly => Decision::allow_with(
                    DecisionState::TrustNotConfigured,
                    "content trust not configured; registry check only",
                ),
                MissingTrustPolicy::Deny => {
                    Decision::deny(DecisionState::TrustNotConfigured, NO_NOTARY_MESSAGE)
                }
            };
        }

        tracing::debug!(
            state = %DecisionState::TrustRequired,
            canonical = %resolution.canonical,
            "Registry authorized, verifying content trust"
        );

        match self.verifier.verify(&resolution.canonical).await {
            Ok(VerifyOutcome::Verified) => {
                self.metrics
                    .record_verification(VerificationRecord::Verified)
                    .await;
                Decision::allow(DecisionState::TrustPassed)
            }
            Ok(VerifyOutcome::InFlight) => {
                self.metrics
                    .record_verification(VerificationRecord::Deduplicated)
                    .await;
                Decision::allow_with(
                    DecisionState::TrustPassed,
                    "verification already in progress",
                )
            }
            Err(e) => {
                // Parse and config errors are raised before any lookup starts.
                if matches!(
                    e,
                    AuthzError::VerificationFailure(_) | AuthzError::VerificationTimeout { .. }
                ) {
                    self.metrics
                        .record_verification(VerificationRecord::Failed)
                        .await;
                }
                Decision::deny(DecisionState::TrustFailed, deny_reason(e))
            }
        }
    }
}

/// Reason reported to the client for a denying error.
fn deny_reason(err: AuthzError) -> String {
    match err {
        AuthzError::RegistryMismatch { allowed, .. } => format!(
            "You can only use docker images from the following authorized registries: {}",
            allowed
        ),
        AuthzError::VerificationFailure(diagnostic) => diagnostic,
        other => other.to_string(),
    }
}

/// Audit line for one decision.
fn log_decision(command: &Command, registry: Option<&str>, decision: &Decision) {
    let uri = command.uri();
    let registry = registry.unwrap_or("-");
    if decision.allow {
        tracing::info!(
            method = %command.method,
            uri = %uri,
            registry = %registry,
            state = %decision.state,
            "[ALLOWED]"
        );
    } else {
        tracing::warn!(
            method = %command.method,
            uri = %uri,
            registry = %registry,
            state = %decision.state,
            reason = %decision.reason,
            "[DENIED]"
        );
    }
}
