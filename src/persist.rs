//! Disk persistence for the translation cache.
//! Two files: a JSON snapshot of the cache entries and a timestamp recording
//! the last full invalidation. The snapshot is written to a temp file and
//! renamed into place so a crash mid-write never leaves a corrupt cache.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::cache::TranslationCache;

const SNAPSHOT_FILE: &str = "translation-cache.json";
const STAMP_FILE: &str = "translation-cache.cleared";

pub struct CacheStore {
    snapshot_path: PathBuf,
    stamp_path: PathBuf,
    invalidation_interval: Duration,
}

impl CacheStore {
    pub fn open(dir: &Path, invalidation_interval: Duration) -> Self {
        Self {
            snapshot_path: dir.join(SNAPSHOT_FILE),
            stamp_path: dir.join(STAMP_FILE),
            invalidation_interval,
        }
    }

    /// Restore the on-disk snapshot into `cache`.
    /// When the last-cleared timestamp is older than the invalidation
    /// interval, the snapshot is deleted instead and a fresh timestamp is
    /// written. A missing or corrupt snapshot silently yields an empty cache.
    pub fn load(&self, cache: &TranslationCache) {
        if self.is_stale() {
            info!("cache snapshot stale, invalidating");
            let _ = std::fs::remove_file(&self.snapshot_path);
            cache.clear();
            self.mark_cleared();
            return;
        }

        let content = match std::fs::read_to_string(&self.snapshot_path) {
            Ok(content) => content,
            Err(_) => {
                debug!("no cache snapshot on disk, starting empty");
                return;
            }
        };

        match serde_json::from_str::<Vec<(String, String)>>(&content) {
            Ok(entries) => {
                let count = entries.len();
                cache.restore(entries);
                info!(entries = count, "cache snapshot restored");
            }
            Err(e) => {
                warn!(error = %e, "cache snapshot corrupt, starting empty");
                let _ = std::fs::remove_file(&self.snapshot_path);
            }
        }
    }

    /// Persist the current cache contents: serialize to `<file>.tmp`, delete
    /// the previous snapshot, rename the temp file into place.
    pub fn save(&self, cache: &TranslationCache) -> Result<(), String> {
        let entries = cache.snapshot();
        let json = serde_json::to_string(&entries)
            .map_err(|e| format!("cache snapshot serialize failed: {e}"))?;

        let tmp_path = self.snapshot_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .map_err(|e| format!("cache snapshot write failed: {e}"))?;

        // Remove-then-rename keeps the replace atomic on every platform.
        let _ = std::fs::remove_file(&self.snapshot_path);
        std::fs::rename(&tmp_path, &self.snapshot_path)
            .map_err(|e| format!("cache snapshot rename failed: {e}"))?;

        debug!(entries = entries.len(), "cache snapshot saved");
        Ok(())
    }

    /// Delete the on-disk snapshot and record the invalidation time.
    pub fn invalidate(&self) {
        let _ = std::fs::remove_file(&self.snapshot_path);
        self.mark_cleared();
    }

    /// Record "cleared now" in the timestamp file.
    pub fn mark_cleared(&self) {
        if let Err(e) = std::fs::write(&self.stamp_path, now_unix().to_string()) {
            warn!(error = %e, "cache timestamp write failed");
        }
    }

    /// True when the last invalidation is older than the configured interval.
    /// A missing or unreadable timestamp counts as fresh (and gets written),
    /// so a first run never discards a snapshot it just created.
    fn is_stale(&self) -> bool {
        let stamp = match std::fs::read_to_string(&self.stamp_path) {
            Ok(content) => content.trim().parse::<u64>().ok(),
            Err(_) => None,
        };
        match stamp {
            Some(cleared_at) => {
                now_unix().saturating_sub(cleared_at) > self.invalidation_interval.as_secs()
            }
            None => {
                self.mark_cleared();
                false
            }
        }
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
