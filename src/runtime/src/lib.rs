//! Image AuthZ Runtime - authorization decisions for daemon commands.
//!
//! Classifies daemon API calls, attributes image references to registries,
//! checks the allow-list and drives content trust verification.

pub mod command;
pub mod engine;
pub mod metrics;
pub mod oci;
pub mod trust;

// Re-export common types
pub use command::{classify, Classification, Command, CommandKind};
pub use engine::{DecisionEngine, NO_NOTARY_MESSAGE, NO_REGISTRIES_MESSAGE};
pub use metrics::{DecisionMetrics, DecisionSnapshot, VerificationRecord};
pub use oci::{resolve, ImageReference, Resolution};
pub use trust::{NotaryCli, StubCapability, TrustCapability, TrustVerifier, VerifyOutcome};

/// Image AuthZ Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
