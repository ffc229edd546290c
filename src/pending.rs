//! In-flight request registry.
//! A key is present iff exactly one request carrying it is queued or being
//! dispatched; this is what guarantees at most one in-flight translation per
//! (caller, text) pair. All mutation happens under a single lock so the
//! add-if-absent check is atomic.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::request::PendingKey;

pub struct PendingSet {
    inner: Mutex<HashSet<PendingKey>>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashSet::new()),
        }
    }

    /// Insert the key if absent. Returns false when the key is already
    /// present — the caller must treat that as "duplicate, drop".
    pub fn try_add(&self, key: PendingKey) -> bool {
        self.inner.lock().insert(key)
    }

    /// Release a key at terminal delivery. Safe to call for absent keys.
    pub fn remove(&self, key: &PendingKey) {
        self.inner.lock().remove(key);
    }

    pub fn contains(&self, key: &PendingKey) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for PendingSet {
    fn default() -> Self {
        Self::new()
    }
}
