//! Image AuthZ Core - Foundational Types
//!
//! This module provides the configuration, error and decision types shared
//! by the decision engine and the plugin server.

pub mod config;
pub mod decision;
pub mod error;
pub mod log;

// Re-export commonly used types
pub use config::{MissingTrustPolicy, PluginConfig, RegistryPolicy, TrustPolicy};
pub use decision::{Decision, DecisionState};
pub use error::{AuthzError, Result};
pub use log::{LogConfig, LogFormat, LogLevel};

/// Image AuthZ version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default public registry. The daemon strips this hostname before the
/// plugin sees a request.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Implicit repository namespace for single-segment images on the default registry.
pub const OFFICIAL_NAMESPACE: &str = "library";

/// Default tag when none is specified.
pub const DEFAULT_TAG: &str = "latest";
