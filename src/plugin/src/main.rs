//! Image AuthZ Plugin - Docker authorization plugin binary.
//!
//! Serves the authorization plugin protocol over a Unix domain socket,
//! allowing images only from allow-listed registries and, when a trust
//! server is configured, only with verified signatures.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use imgauthz_core::config::{
    DEFAULT_NOTARY_SERVER, DEFAULT_TLS_DIR, DEFAULT_TRUST_DIR, DEFAULT_VERIFY_TIMEOUT_SECS,
};
use imgauthz_core::{LogConfig, LogFormat, LogLevel};
use imgauthz_runtime::trust::DEFAULT_NOTARY_BIN;
use imgauthz_runtime::{DecisionEngine, NotaryCli};

use imgauthz_plugin::bootstrap::{build_config, Settings};
use imgauthz_plugin::server::{PluginServer, DEFAULT_SOCKET_PATH};

/// Docker image authorization plugin
#[derive(Parser, Debug)]
#[command(name = "img-authz-plugin", version, about = "Docker image authorization plugin")]
struct Args {
    /// Comma separated list of authorized registries.
    #[arg(long, env = "REGISTRY", default_value = imgauthz_core::DEFAULT_REGISTRY)]
    registry: String,

    /// Trust server address. Use "none" to disable content trust.
    #[arg(long, env = "NOTARY", default_value = DEFAULT_NOTARY_SERVER)]
    notary: String,

    /// PEM encoded root certificate of the trust server.
    #[arg(long, env = "NOTARY_ROOT_CA", hide_env_values = true)]
    notary_root_ca: Option<String>,

    /// Path to the Unix domain socket for plugin communication.
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Local trust data directory.
    #[arg(long, default_value = DEFAULT_TRUST_DIR)]
    trust_dir: PathBuf,

    /// Directory holding per-server root certificates.
    #[arg(long, default_value = DEFAULT_TLS_DIR)]
    tls_dir: PathBuf,

    /// Trust verifier executable.
    #[arg(long, default_value = DEFAULT_NOTARY_BIN)]
    notary_bin: PathBuf,

    /// Upper bound on a single trust verification, in seconds.
    #[arg(long, default_value_t = DEFAULT_VERIFY_TIMEOUT_SECS)]
    verify_timeout_secs: u64,

    /// Deny image commands when no trust server is configured.
    #[arg(long)]
    require_trust: bool,

    /// Return verifier output to clients without redaction.
    #[arg(long)]
    no_redact: bool,

    /// Log output format (text, json).
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Log level, overridden by RUST_LOG.
    #[arg(long, default_value = "info")]
    log_level: LogLevel,
}

fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));
    match config.format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_tracing(&LogConfig {
        format: args.log_format,
        level: args.log_level,
    });

    tracing::info!(
        version = imgauthz_core::VERSION,
        socket = %args.socket.display(),
        "Starting image authorization plugin"
    );

    let settings = Settings {
        registries: args.registry,
        notary: args.notary,
        notary_root_ca: args.notary_root_ca,
        trust_dir: args.trust_dir,
        tls_dir: args.tls_dir,
        verify_timeout_secs: args.verify_timeout_secs,
        require_trust: args.require_trust,
        redact_diagnostics: !args.no_redact,
    };
    let config =
        build_config(&settings).map_err(|e| format!("Failed to configure plugin: {}", e))?;

    let capability = Arc::new(NotaryCli::new(args.notary_bin));
    let engine = Arc::new(DecisionEngine::new(Arc::new(config), capability));

    let server = PluginServer::new(args.socket, engine);
    server.serve().await?;

    tracing::info!("Plugin stopped");
    Ok(())
}
