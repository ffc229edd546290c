//! Engine configuration: provider selection, language pair, credentials,
//! batching caps, caching policy, delivery delay.
//! Loaded from JSON with a silent fallback to defaults; the preferences UI
//! that owns these values lives outside this crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Hard cap on items per extracted batch.
pub const MAX_ITEMS_PER_BATCH: usize = 100;
/// Hard cap on total characters per extracted batch.
pub const MAX_CHARS_PER_BATCH: usize = 49_000;
/// Requests at or above this priority trigger an immediate drain.
pub const HIGH_PRIORITY_THRESHOLD: i32 = 10;
/// Forced drains run at most this many extraction cycles before yielding.
pub const MAX_DRAIN_CYCLES: usize = 5;
/// Adaptive batch size bounds and step.
pub const MIN_ADAPTIVE_BATCH: usize = 10;
pub const ADAPTIVE_BATCH_STEP: usize = 5;
/// Adaptive delayed-extraction timeout bounds.
pub const MIN_FLUSH_DELAY_MS: u64 = 200;
pub const MAX_FLUSH_DELAY_MS: u64 = 2000;

/// Which translation backend handles dispatched batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local on-device model, single-item only.
    OnDevice,
    /// LibreTranslate-style HTTP service, single-item only.
    Libre,
    /// DeepL-style HTTP service, supports true multi-item batches.
    Deepl,
}

/// Per-source enable flags. The hooking layer that produces requests checks
/// these before submitting; the engine itself treats them as opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFlags {
    pub ui_text: bool,
    pub canvas_text: bool,
    pub notifications: bool,
}

impl Default for SourceFlags {
    fn default() -> Self {
        Self {
            ui_text: true,
            canvas_text: false,
            notifications: true,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub provider: ProviderKind,
    /// ISO 639-1 source code, or None for auto-detect.
    pub source_lang: Option<String>,
    pub target_lang: String,
    /// Credentials for the remote providers. Empty means unset.
    pub libre_api_key: String,
    pub deepl_api_key: String,
    /// Endpoint overrides (self-hosted instances).
    pub libre_endpoint: String,
    pub deepl_endpoint: String,
    /// Multi-item batch requests (only honored by batch-capable providers).
    pub batch_mode: bool,
    /// Starting value for the adaptive batch size.
    pub initial_batch_size: usize,
    /// Delay applied between dispatch completion and visible delivery.
    pub post_translation_delay_ms: u64,
    /// Result caching on/off.
    pub caching: bool,
    pub cache_capacity: usize,
    /// Full cache invalidation interval, seconds.
    pub cache_invalidation_secs: u64,
    /// Directory holding the cache snapshot and timestamp files.
    pub cache_dir: PathBuf,
    /// Absolute deadline for one on-device model invocation, milliseconds.
    pub local_deadline_ms: u64,
    pub sources: SourceFlags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Libre,
            source_lang: None,
            target_lang: "en".to_string(),
            libre_api_key: String::new(),
            deepl_api_key: String::new(),
            libre_endpoint: "https://libretranslate.com/translate".to_string(),
            deepl_endpoint: "https://api-free.deepl.com/v2/translate".to_string(),
            batch_mode: true,
            initial_batch_size: 20,
            post_translation_delay_ms: 0,
            caching: true,
            cache_capacity: 200,
            cache_invalidation_secs: 24 * 3600,
            cache_dir: PathBuf::from("."),
            local_deadline_ms: 5000,
            sources: SourceFlags::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file is missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "config parse failed, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn post_translation_delay(&self) -> Duration {
        Duration::from_millis(self.post_translation_delay_ms)
    }

    pub fn local_deadline(&self) -> Duration {
        Duration::from_millis(self.local_deadline_ms)
    }

    pub fn cache_invalidation_interval(&self) -> Duration {
        Duration::from_secs(self.cache_invalidation_secs)
    }
}
