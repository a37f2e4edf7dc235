//! Image reference parsing.
//!
//! Parses references like `myregistry.example.com:5000/team/app:v1` into
//! structured components and builds the globally unique name (GUN) under
//! which content trust data is published.

use imgauthz_core::error::{AuthzError, Result};
use imgauthz_core::{DEFAULT_REGISTRY, DEFAULT_TAG, OFFICIAL_NAMESPACE};

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Reference as it was parsed (trimmed)
    pub raw: String,
    /// Registry hostname, if the reference names one
    pub registry: Option<String>,
    /// Repository path as written (e.g., "nginx", "team/app")
    pub repository: String,
    /// Tag, "latest" when not given
    pub tag: String,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// - `nginx` → registry absent, repository `nginx`, tag `latest`
    /// - `nginx:1.25` → tag `1.25`
    /// - `docker.io/nginx` → registry `docker.io`
    /// - `myregistry.io:5000/img:v1` → registry `myregistry.io:5000`, tag `v1`
    /// - `ghcr.io/org/image@sha256:abc` → digest `sha256:abc`, tag `latest`
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(AuthzError::ParseError("Empty image reference".to_string()));
        }

        // Split off digest first (@ separator)
        let (name_tag, digest) = match reference.rfind('@') {
            Some(at_pos) => {
                let digest_part = &reference[at_pos + 1..];
                if !digest_part.contains(':') {
                    return Err(AuthzError::ParseError(format!(
                        "Invalid digest format in reference '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (&reference[..at_pos], Some(digest_part.to_string()))
            }
            None => (reference, None),
        };

        // The tag separator is the last colon after the last slash; a colon
        // before the last slash belongs to a registry port.
        let tag_start = name_tag.rfind('/').map(|pos| pos + 1).unwrap_or(0);
        let (name, tag) = match name_tag[tag_start..].rfind(':') {
            Some(colon_pos) => {
                let split = tag_start + colon_pos;
                (&name_tag[..split], Some(&name_tag[split + 1..]))
            }
            None => (name_tag, None),
        };

        if name.is_empty() {
            return Err(AuthzError::ParseError(format!(
                "Empty repository in reference '{}'",
                reference
            )));
        }
        if tag.is_some_and(str::is_empty) {
            return Err(AuthzError::ParseError(format!(
                "Empty tag in reference '{}'",
                reference
            )));
        }

        let (registry, repository) = Self::split_registry_repository(name)?;

        Ok(ImageReference {
            raw: reference.to_string(),
            registry,
            repository,
            tag: tag.unwrap_or(DEFAULT_TAG).to_string(),
            digest,
        })
    }

    /// Split a name into an optional registry and the repository path.
    ///
    /// The first component is a registry hostname when it contains a dot or
    /// a colon, or is `localhost`.
    fn split_registry_repository(name: &str) -> Result<(Option<String>, String)> {
        if let Some(slash_pos) = name.find('/') {
            let first = &name[..slash_pos];
            if first.contains('.') || first.contains(':') || first == "localhost" {
                let repo = &name[slash_pos + 1..];
                if repo.is_empty() {
                    return Err(AuthzError::ParseError(format!(
                        "Empty repository in reference '{}'",
                        name
                    )));
                }
                return Ok((Some(first.to_string()), repo.to_string()));
            }
        }
        Ok((None, name.to_string()))
    }

    /// Registry the reference points at, inferring the default public registry.
    pub fn registry_or_default(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    /// Globally unique name: registry and repository, with the implicit
    /// `library/` namespace restored for official images.
    pub fn gun(&self) -> String {
        let registry = self.registry_or_default();
        if registry == DEFAULT_REGISTRY && !self.repository.contains('/') {
            format!("{}/{}/{}", registry, OFFICIAL_NAMESPACE, self.repository)
        } else {
            format!("{}/{}", registry, self.repository)
        }
    }

    /// `gun:tag`, the key content trust is checked and deduplicated under.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.gun(), self.tag)
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())?;
        if let Some(ref digest) = self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
