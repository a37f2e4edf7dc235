//! Registry resolution against the allow-list.
//!
//! The daemon strips the default public registry's hostname before the
//! plugin sees a request, so `ubuntu` may mean "explicitly Docker Hub" or
//! "implicitly Docker Hub". Resolution is a heuristic: it cannot always tell
//! a registry host from the first segment of a multi-level repository path.

use imgauthz_core::DEFAULT_REGISTRY;

/// Outcome of resolving a raw reference against one allow-listed registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Reference to verify and report
    pub canonical: String,
    /// Registry the reference was attributed to
    pub registry: String,
    /// False only when no image reference was extracted
    pub is_registry_command: bool,
}

impl Resolution {
    fn none() -> Self {
        Self {
            canonical: String::new(),
            registry: String::new(),
            is_registry_command: false,
        }
    }
}

/// Resolve `raw` against a single allow-listed registry.
///
/// 1. `<allowed>/...` is unambiguous and returned unchanged.
/// 2. With the default public registry allow-listed, the hostname is
///    prepended. If the reference really targeted another registry the
///    rewritten name has no trust data, so verification denies it.
/// 3. Otherwise the segment before the first `/` is the requested registry,
///    and a reference without `/` belongs to the default public registry.
pub fn resolve(raw: &str, allowed: &str) -> Resolution {
    let raw = raw.trim();
    if raw.is_empty() {
        return Resolution::none();
    }

    if !allowed.is_empty() {
        if let Some(rest) = raw.strip_prefix(allowed) {
            if rest.starts_with('/') {
                return Resolution {
                    canonical: raw.to_string(),
                    registry: allowed.to_string(),
                    is_registry_command: true,
                };
            }
        }
    }

    if allowed == DEFAULT_REGISTRY {
        return Resolution {
            canonical: format!("{}/{}", DEFAULT_REGISTRY, raw),
            registry: DEFAULT_REGISTRY.to_string(),
            is_registry_command: true,
        };
    }

    let registry = match raw.find('/') {
        Some(idx) => &raw[..idx],
        None => DEFAULT_REGISTRY,
    };

    Resolution {
        canonical: raw.to_string(),
        registry: registry.to_string(),
        is_registry_command: true,
    }
}
