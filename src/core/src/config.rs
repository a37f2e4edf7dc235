use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AuthzError, Result};
use crate::DEFAULT_REGISTRY;

/// Public trust server used when none is configured.
pub const DEFAULT_NOTARY_SERVER: &str = "https://notary.docker.io";

/// Local trust data cache passed to the verifier.
pub const DEFAULT_TRUST_DIR: &str = "/root/.docker/trust";

/// Root directory under which per-server root certificates are written.
pub const DEFAULT_TLS_DIR: &str = "/root/.docker/tls";

/// File name of a trust server root certificate inside its host directory.
pub const ROOT_CA_FILE: &str = "root-ca.crt";

/// Default bound on a single trust verification.
pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 60;

/// Plugin configuration, fixed at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Registries images may be pulled from
    pub registries: RegistryPolicy,

    /// Content trust settings
    pub trust: TrustPolicy,
}

/// Set of allow-listed registry hostnames.
///
/// Ordered so that deny messages enumerate registries deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryPolicy {
    registries: BTreeSet<String>,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self::new([DEFAULT_REGISTRY])
    }
}

impl RegistryPolicy {
    /// Build a policy from registry hostnames. Blank entries are ignored.
    pub fn new<I, S>(registries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let registries = registries
            .into_iter()
            .map(|r| r.as_ref().trim().trim_end_matches('/').to_string())
            .filter(|r| !r.is_empty())
            .collect();
        Self { registries }
    }

    /// A policy that denies every image command.
    pub fn empty() -> Self {
        Self {
            registries: BTreeSet::new(),
        }
    }

    /// Parse a comma separated registry list (the `REGISTRY` env format).
    pub fn from_list(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn contains(&self, registry: &str) -> bool {
        self.registries.contains(registry)
    }

    /// Registries in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.registries.iter().map(String::as_str)
    }

    /// Comma separated list used in deny messages.
    pub fn describe(&self) -> String {
        self.iter().collect::<Vec<_>>().join(", ")
    }
}

/// What to do when a registry is allowed but no trust server is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingTrustPolicy {
    /// Decide on the registry check alone.
    #[default]
    AllowRegistryOnly,
    /// Mandatory signing: deny every image command.
    Deny,
}

impl std::fmt::Display for MissingTrustPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllowRegistryOnly => write!(f, "allow-registry-only"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

impl std::str::FromStr for MissingTrustPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "allow-registry-only" | "allow" => Ok(Self::AllowRegistryOnly),
            "deny" => Ok(Self::Deny),
            _ => Err(format!(
                "unknown missing-trust policy: '{}' (supported: allow-registry-only, deny)",
                s
            )),
        }
    }
}

/// Content trust settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustPolicy {
    /// Trust server address, always `https://`. `None` disables verification.
    pub server: Option<String>,

    /// Root certificate of the trust server, if one was provided
    pub root_ca: Option<PathBuf>,

    /// Local trust data directory handed to the verifier
    pub trust_dir: PathBuf,

    /// Upper bound on a single verification, in seconds
    pub timeout_secs: u64,

    /// Behaviour when `server` is `None`
    pub on_missing: MissingTrustPolicy,

    /// Strip local paths and cap length of verifier output before returning it
    pub redact_diagnostics: bool,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            server: Some(DEFAULT_NOTARY_SERVER.to_string()),
            root_ca: None,
            trust_dir: PathBuf::from(DEFAULT_TRUST_DIR),
            timeout_secs: DEFAULT_VERIFY_TIMEOUT_SECS,
            on_missing: MissingTrustPolicy::default(),
            redact_diagnostics: true,
        }
    }
}

impl TrustPolicy {
    /// A policy with verification switched off.
    pub fn disabled() -> Self {
        Self {
            server: None,
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        self.server.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Normalize a trust server address to an `https://` URL.
///
/// Empty input or `none` means "no trust server" and yields `Ok(None)`.
pub fn normalize_server_url(raw: &str) -> Result<Option<String>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    let candidate = if let Some(rest) = raw.strip_prefix("http://") {
        format!("https://{}", rest)
    } else if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let parsed = url::Url::parse(&candidate).map_err(|e| {
        AuthzError::ConfigError(format!("Invalid trust server address '{}': {}", raw, e))
    })?;
    if parsed.scheme() != "https" {
        return Err(AuthzError::ConfigError(format!(
            "Unsupported trust server scheme '{}' in '{}'",
            parsed.scheme(),
            raw
        )));
    }
    if parsed.host_str().is_none() {
        return Err(AuthzError::ConfigError(format!(
            "Trust server address '{}' has no host",
            raw
        )));
    }

    Ok(Some(candidate.trim_end_matches('/').to_string()))
}

/// `host[:port]` of a trust server URL.
pub fn server_host(server: &str) -> Option<String> {
    let parsed = url::Url::parse(server).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Well-known location of a trust server's root certificate.
pub fn root_ca_path(tls_dir: &Path, server: &str) -> Option<PathBuf> {
    server_host(server).map(|host| tls_dir.join(host).join(ROOT_CA_FILE))
}
