//! Authorization plugin wire types.
//!
//! Field names follow the daemon's JSON encoding. Bodies are base64 strings
//! and may be `null`.

use std::collections::BTreeMap;

use imgauthz_core::Decision;
use imgauthz_runtime::Command;
use serde::{Deserialize, Serialize};

/// Content type of every plugin response.
pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.2+json";

/// Name of the plugin subsystem this server implements.
pub const AUTHZ_SUBSYSTEM: &str = "authz";

/// Reply to `/Plugin.Activate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateResponse {
    pub implements: Vec<String>,
}

impl Default for ActivateResponse {
    fn default() -> Self {
        Self {
            implements: vec![AUTHZ_SUBSYSTEM.to_string()],
        }
    }
}

/// Request sent by the daemon for both pre-action and post-action checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthzRequest {
    #[serde(default)]
    pub user: String,

    #[serde(default, rename = "UserAuthNMethod")]
    pub user_authn_method: String,

    #[serde(default)]
    pub request_method: String,

    #[serde(default)]
    pub request_uri: String,

    #[serde(default, with = "base64_body")]
    pub request_body: Option<Vec<u8>>,

    #[serde(default)]
    pub request_headers: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub response_status_code: i32,

    #[serde(default, with = "base64_body")]
    pub response_body: Option<Vec<u8>>,

    #[serde(default)]
    pub response_headers: Option<BTreeMap<String, String>>,
}

impl AuthzRequest {
    /// The daemon command this request describes.
    pub fn to_command(&self) -> Command {
        Command::from_request_uri(
            &self.request_method,
            &self.request_uri,
            self.request_body.clone().unwrap_or_default(),
        )
    }
}

/// Plugin answer. `Msg` carries the deny reason, `Err` a processing failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthzResponse {
    pub allow: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub msg: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err: String,
}

impl AuthzResponse {
    pub fn allow() -> Self {
        Self {
            allow: true,
            ..Self::default()
        }
    }

    pub fn deny(msg: impl Into<String>) -> Self {
        Self {
            allow: false,
            msg: msg.into(),
            err: String::new(),
        }
    }

    pub fn error(err: impl Into<String>) -> Self {
        Self {
            allow: false,
            msg: String::new(),
            err: err.into(),
        }
    }
}

impl From<&Decision> for AuthzResponse {
    fn from(decision: &Decision) -> Self {
        if decision.allow {
            Self::allow()
        } else {
            Self::deny(decision.reason.clone())
        }
    }
}

mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match body {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        match encoded {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => STANDARD
                .decode(s.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgauthz_core::DecisionState;
    use imgauthz_runtime::CommandKind;

    #[test]
    fn test_activate_response_shape() {
        let json = serde_json::to_string(&ActivateResponse::default()).unwrap();
        assert_eq!(json, r#"{"Implements":["authz"]}"#);
    }

    #[test]
    fn test_parse_container_create_request() {
        // {"Image":"ubuntu"}
        let json = r#"{
            "User": "",
            "UserAuthNMethod": "",
            "RequestMethod": "POST",
            "RequestUri": "/v1.41/containers/create?name=web",
            "RequestBody": "eyJJbWFnZSI6InVidW50dSJ9",
            "RequestHeaders": {"Content-Type": "application/json"},
            "ResponseStatusCode": 0,
            "ResponseBody": null,
            "ResponseHeaders": null
        }"#;
        let req: AuthzRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.request_body.as_deref(), Some(&br#"{"Image":"ubuntu"}"#[..]));
        assert!(req.response_body.is_none());

        let cmd = req.to_command();
        assert_eq!(cmd.kind(), CommandKind::ContainerCreate);
        assert_eq!(cmd.query_param("name"), Some("web"));
    }

    #[test]
    fn test_parse_minimal_request() {
        let req: AuthzRequest =
            serde_json::from_str(r#"{"RequestMethod":"GET","RequestUri":"/_ping"}"#).unwrap();
        assert!(req.request_body.is_none());
        assert!(req.request_headers.is_none());
        assert_eq!(req.to_command().kind(), CommandKind::Other);
    }

    #[test]
    fn test_bad_base64_body_is_rejected() {
        let err = serde_json::from_str::<AuthzRequest>(
            r#"{"RequestMethod":"POST","RequestUri":"/x","RequestBody":"!!!"}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_allow_response_omits_empty_fields() {
        let json = serde_json::to_string(&AuthzResponse::allow()).unwrap();
        assert_eq!(json, r#"{"Allow":true}"#);
    }

    #[test]
    fn test_deny_response_from_decision() {
        let decision = Decision::deny(DecisionState::RegistryDenied, "not allowed");
        let resp = AuthzResponse::from(&decision);
        assert!(!resp.allow);
        assert_eq!(resp.msg, "not allowed");
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"Allow":false,"Msg":"not allowed"}"#);
    }

    #[test]
    fn test_allowed_decision_drops_reason() {
        let decision = Decision::allow_with(DecisionState::TrustNotConfigured, "registry only");
        assert_eq!(AuthzResponse::from(&decision), AuthzResponse::allow());
    }
}
