//! Content trust verification.
//!
//! - [`capability`] defines the external lookup seam and the `notary` CLI implementation
//! - [`inflight`] deduplicates concurrent verifications of one reference
//! - [`verifier`] builds the lookup, enforces the timeout and shapes errors

pub mod capability;
pub mod inflight;
mod redact;
mod stub;
pub mod verifier;

pub use capability::{LookupOutput, LookupRequest, NotaryCli, TrustCapability, DEFAULT_NOTARY_BIN};
pub use inflight::{InFlightGuard, InFlightVerifications};
pub use redact::{redact_diagnostic, MAX_DIAGNOSTIC_BYTES};
pub use stub::StubCapability;
pub use verifier::{TrustVerifier, VerifyOutcome};
