//! Plugin-specific error conversions.

use imgauthz_core::error::AuthzError;

use crate::protocol::AuthzResponse;

/// Convert an AuthzError that stopped the plugin from reaching a decision
/// into a plugin response. The daemon reports `Err` to the client and
/// refuses the command.
pub fn error_to_response(err: AuthzError) -> AuthzResponse {
    match err {
        AuthzError::ParseError(msg) | AuthzError::SerializationError(msg) => {
            AuthzResponse::error(format!("invalid request: {}", msg))
        }
        other => AuthzResponse::error(other.to_string()),
    }
}
