//! Authorization decisions.

use serde::{Deserialize, Serialize};

/// Where a request ended up in the decision state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionState {
    /// Not a container/image/service create command.
    NotImageCommand,
    /// An image command without a usable image reference.
    NoRegistryFound,
    /// No allow-listed registries, or the resolved registry is not on the list.
    RegistryDenied,
    /// Registry allowed, content trust must be checked.
    TrustRequired,
    /// Content trust verified (or already being verified).
    TrustPassed,
    /// Verifier rejected the image or did not finish in time.
    TrustFailed,
    /// Registry allowed but no trust server is configured.
    TrustNotConfigured,
    /// Post-action check on the daemon's response.
    ResponseChecked,
}

impl DecisionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotImageCommand => "not_image_command",
            Self::NoRegistryFound => "no_registry_found",
            Self::RegistryDenied => "registry_denied",
            Self::TrustRequired => "trust_required",
            Self::TrustPassed => "trust_passed",
            Self::TrustFailed => "trust_failed",
            Self::TrustNotConfigured => "trust_not_configured",
            Self::ResponseChecked => "response_checked",
        }
    }
}

impl std::fmt::Display for DecisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final allow/deny verdict for one daemon command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allow: bool,
    /// Empty for most allows; explains every deny.
    pub reason: String,
    pub state: DecisionState,
}

impl Decision {
    pub fn allow(state: DecisionState) -> Self {
        Self {
            allow: true,
            reason: String::new(),
            state,
        }
    }

    pub fn allow_with(state: DecisionState, reason: impl Into<String>) -> Self {
        Self {
            allow: true,
            reason: reason.into(),
            state,
        }
    }

    pub fn deny(state: DecisionState, reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: reason.into(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_has_empty_reason() {
        let d = Decision::allow(DecisionState::NotImageCommand);
        assert!(d.allow);
        assert!(d.reason.is_empty());
    }

    #[test]
    fn test_deny_carries_reason() {
        let d = Decision::deny(DecisionState::TrustFailed, "no trust data");
        assert!(!d.allow);
        assert_eq!(d.reason, "no trust data");
        assert_eq!(d.state, DecisionState::TrustFailed);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(DecisionState::RegistryDenied.to_string(), "registry_denied");
        let json = serde_json::to_string(&DecisionState::TrustNotConfigured).unwrap();
        assert_eq!(json, "\"trust_not_configured\"");
        assert_eq!(DecisionState::ResponseChecked.as_str(), "response_checked");
    }
}
