//! Startup configuration.
//!
//! Turns raw settings (flags and environment) into an immutable
//! [`PluginConfig`], writing the trust server's root certificate to its
//! well-known location on the way.

use std::path::{Path, PathBuf};

use imgauthz_core::config::{
    normalize_server_url, root_ca_path, DEFAULT_TLS_DIR, DEFAULT_TRUST_DIR,
    DEFAULT_VERIFY_TIMEOUT_SECS,
};
use imgauthz_core::error::{AuthzError, Result};
use imgauthz_core::{MissingTrustPolicy, PluginConfig, RegistryPolicy, TrustPolicy};

/// Raw startup settings, before validation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Comma separated allow-list
    pub registries: String,
    /// Trust server address; empty or `none` disables verification
    pub notary: String,
    /// PEM text of the trust server root certificate
    pub notary_root_ca: Option<String>,
    pub trust_dir: PathBuf,
    pub tls_dir: PathBuf,
    pub verify_timeout_secs: u64,
    pub require_trust: bool,
    pub redact_diagnostics: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registries: imgauthz_core::DEFAULT_REGISTRY.to_string(),
            notary: imgauthz_core::config::DEFAULT_NOTARY_SERVER.to_string(),
            notary_root_ca: None,
            trust_dir: PathBuf::from(DEFAULT_TRUST_DIR),
            tls_dir: PathBuf::from(DEFAULT_TLS_DIR),
            verify_timeout_secs: DEFAULT_VERIFY_TIMEOUT_SECS,
            require_trust: false,
            redact_diagnostics: true,
        }
    }
}

/// Validate settings and produce the plugin configuration.
///
/// Fails when the trust server address is invalid or the root certificate
/// cannot be written.
pub fn build_config(settings: &Settings) -> Result<PluginConfig> {
    let registries = RegistryPolicy::from_list(&settings.registries);
    if registries.is_empty() {
        tracing::warn!("No authorized registries configured, every image command will be denied");
    }

    let server = normalize_server_url(&settings.notary)?;
    let root_ca = match server.as_deref() {
        Some(server) => prepare_root_ca(
            &settings.tls_dir,
            server,
            settings.notary_root_ca.as_deref(),
        )?,
        None => {
            if settings
                .notary_root_ca
                .as_deref()
                .is_some_and(|pem| !pem.trim().is_empty())
            {
                tracing::warn!("Root certificate provided without a trust server, ignoring");
            }
            None
        }
    };

    let on_missing = if settings.require_trust {
        MissingTrustPolicy::Deny
    } else {
        MissingTrustPolicy::AllowRegistryOnly
    };

    let trust = TrustPolicy {
        server,
        root_ca,
        trust_dir: settings.trust_dir.clone(),
        timeout_secs: settings.verify_timeout_secs,
        on_missing,
        redact_diagnostics: settings.redact_diagnostics,
    };

    tracing::info!(
        registries = %registries.describe(),
        notary = trust.server.as_deref().unwrap_or("none"),
        root_ca = ?trust.root_ca,
        on_missing = %trust.on_missing,
        timeout_secs = trust.timeout_secs,
        "Plugin configured"
    );

    Ok(PluginConfig { registries, trust })
}

/// Root certificate to pass to the verifier for `server`.
///
/// Provided PEM text is written to the well-known path. Without it, a
/// certificate already present there is used.
fn prepare_root_ca(tls_dir: &Path, server: &str, pem: Option<&str>) -> Result<Option<PathBuf>> {
    match pem.map(str::trim) {
        Some(pem) if !pem.is_empty() => write_root_ca(tls_dir, server, pem).map(Some),
        _ => Ok(root_ca_path(tls_dir, server).filter(|path| path.is_file())),
    }
}

/// Write `pem` to `<tls_dir>/<server host>/root-ca.crt`, replacing any
/// previous content.
pub fn write_root_ca(tls_dir: &Path, server: &str, pem: &str) -> Result<PathBuf> {
    let path = root_ca_path(tls_dir, server).ok_or_else(|| {
        AuthzError::ConfigError(format!("Trust server address '{}' has no host", server))
    })?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AuthzError::ConfigError(format!(
                "Failed to create certificate directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut contents = pem.to_string();
    if !contents.ends_with('\n') {
        contents.push('\n');
    }
    std::fs::write(&path, contents).map_err(|e| {
        AuthzError::ConfigError(format!(
            "Failed to write root certificate {}: {}",
            path.display(),
            e
        ))
    })?;

    tracing::debug!(path = %path.display(), "Wrote trust server root certificate");
    Ok(path)
}
