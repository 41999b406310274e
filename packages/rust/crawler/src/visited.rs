//! Membership set of URLs already claimed by a traversal.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable handle to a shared set of claimed URLs.
///
/// Clones share the same set. Entries are never removed.
#[derive(Debug, Clone, Default)]
pub struct VisitedTracker {
    urls: Arc<Mutex<HashSet<String>>>,
}

impl VisitedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // A panic while holding the lock cannot leave the set half-updated.
        self.urls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `url` visited. Returns `false` if it was already claimed.
    ///
    /// Check and insert happen under one lock, so two crawls sharing the
    /// tracker can never both claim the same URL.
    pub fn claim(&self, url: &str) -> bool {
        self.lock().insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains(url)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
