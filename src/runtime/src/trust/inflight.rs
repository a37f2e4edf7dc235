//! Tracking of verifications currently in progress.

use std::sync::Arc;

use dashmap::DashSet;

/// Canonical references with a verification in progress.
///
/// Shared by every request. Membership test and insert happen in one
/// `DashSet::insert`, so exactly one caller wins the right to verify a
/// reference; the returned guard removes it again on drop.
#[derive(Clone, Default)]
pub struct InFlightVerifications {
    inner: Arc<DashSet<String>>,
}

impl InFlightVerifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Returns `None` if another verification already holds it.
    pub fn try_begin(&self, key: &str) -> Option<InFlightGuard> {
        if self.inner.insert(key.to_string()) {
            Some(InFlightGuard {
                set: self.inner.clone(),
                key: key.to_string(),
            })
        } else {
            None
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Releases an in-flight claim when dropped, on every exit path.
pub struct InFlightGuard {
    set: Arc<DashSet<String>>,
    key: String,
}

impl InFlightGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}
