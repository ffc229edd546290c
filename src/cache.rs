//! Bounded LRU map of original text to translated text.
//! One exclusive lock covers every read, write, and snapshot site so
//! persistence can never race concurrent mutation. No-op translations
//! (translated == original) are never stored.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

pub struct TranslationCache {
    inner: Mutex<LruCache<String, String>>,
    enabled: AtomicBool,
}

impl TranslationCache {
    pub fn new(capacity: usize, enabled: bool) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Look up a cached translation, refreshing its recency.
    /// Always absent while caching is disabled.
    pub fn get(&self, text: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        self.inner.lock().get(text).cloned()
    }

    /// Store a translation. No-op when caching is disabled or when the
    /// translated value equals its key.
    pub fn put(&self, text: &str, translated: &str) {
        if !self.is_enabled() || text == translated {
            return;
        }
        self.inner
            .lock()
            .put(text.to_string(), translated.to_string());
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Toggle caching. Disabling also drops all entries.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            self.clear();
        }
    }

    /// Snapshot all entries, most recently used first.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.inner
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Restore entries from a snapshot taken by [`snapshot`](Self::snapshot).
    /// Entries are reinserted oldest-first so recency order survives the
    /// round trip.
    pub fn restore(&self, entries: Vec<(String, String)>) {
        if !self.is_enabled() {
            return;
        }
        let mut cache = self.inner.lock();
        for (text, translated) in entries.into_iter().rev() {
            if text != translated {
                cache.put(text, translated);
            }
        }
    }
}
