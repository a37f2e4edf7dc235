//! Image AuthZ Plugin - Docker authorization plugin server.
//!
//! Speaks the daemon's authorization plugin protocol over a Unix socket and
//! answers each request with a decision from
//! [`imgauthz_runtime::DecisionEngine`].

pub mod bootstrap;
pub mod error;
pub mod protocol;
pub mod server;

pub use protocol::{ActivateResponse, AuthzRequest, AuthzResponse, PLUGIN_CONTENT_TYPE};
pub use server::{PluginServer, DEFAULT_SOCKET_PATH};
