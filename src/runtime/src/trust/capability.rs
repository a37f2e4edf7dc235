//! External content trust lookup.
//!
//! The lookup itself is an opaque capability: production shells out to the
//! `notary` CLI, tests use [`super::StubCapability`].

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use imgauthz_core::error::{AuthzError, Result};

/// Default verifier executable, resolved through `PATH`.
pub const DEFAULT_NOTARY_BIN: &str = "notary";

/// Everything the external verifier needs for one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    /// Trust server address
    pub server: String,
    /// Local trust data directory
    pub trust_dir: PathBuf,
    /// Root certificate of the trust server
    pub root_ca: Option<PathBuf>,
    /// Globally unique name, e.g. `docker.io/library/ubuntu`
    pub gun: String,
    pub tag: String,
}

/// Completion status and combined output of a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupOutput {
    pub success: bool,
    pub output: String,
}

/// A way of checking signed trust data for an image tag.
///
/// Implementations must be cancel-safe: the verifier drops the future when
/// the verification timeout expires.
#[async_trait]
pub trait TrustCapability: Send + Sync {
    async fn lookup(&self, request: &LookupRequest) -> Result<LookupOutput>;
}

/// Runs `notary lookup` as a child process.
#[derive(Debug, Clone)]
pub struct NotaryCli {
    program: PathBuf,
    base_args: Vec<String>,
}

impl Default for NotaryCli {
    fn default() -> Self {
        Self::new(DEFAULT_NOTARY_BIN)
    }
}

impl NotaryCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    /// Arguments placed before the lookup arguments (e.g. a wrapper script).
    pub fn with_args<I, S>(program: impl Into<PathBuf>, base_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            base_args: base_args.into_iter().map(Into::into).collect(),
        }
    }

    /// `-s <server> -d <trust dir> [--tlscacert <ca>] lookup <gun> <tag>`
    pub fn lookup_args(&self, request: &LookupRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.base_args.iter().map(OsString::from).collect();
        args.push("-s".into());
        args.push(request.server.clone().into());
        args.push("-d".into());
        args.push(request.trust_dir.clone().into());
        if let Some(ref ca) = request.root_ca {
            args.push("--tlscacert".into());
            args.push(ca.clone().into());
        }
        args.push("lookup".into());
        args.push(request.gun.clone().into());
        args.push(request.tag.clone().into());
        args
    }
}

#[async_trait]
impl TrustCapability for NotaryCli {
    async fn lookup(&self, request: &LookupRequest) -> Result<LookupOutput> {
        tracing::debug!(
            program = %self.program.display(),
            server = %request.server,
            gun = %request.gun,
            tag = %request.tag,
            "Running trust lookup"
        );

        let output = tokio::process::Command::new(&self.program)
            .args(self.lookup_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AuthzError::VerificationFailure(format!(
                    "Failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(LookupOutput {
            success: output.status.success(),
            output: combined,
        })
    }
}
