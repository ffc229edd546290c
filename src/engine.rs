//! Engine facade.
//! Wires intake dedup, the adaptive batch queue, the configured provider,
//! the result cache with its disk snapshot, and the delivery loop into one
//! handle. Submission is non-blocking and synchronous; results come back
//! asynchronously through the caller's target or fallback.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::TranslationCache;
use crate::config::{EngineConfig, ProviderKind};
use crate::deliver;
use crate::metrics::{metric_names, MetricSummary, MetricsRegistry};
use crate::pending::PendingSet;
use crate::persist::CacheStore;
use crate::provider::{
    DeeplProvider, LibreProvider, LocalModel, OnDeviceProvider, ProviderClient, Translator,
};
use crate::queue::BatchQueue;
use crate::request::{CallerRef, FallbackFn, TranslationRequest};

pub struct Engine {
    pending: Arc<PendingSet>,
    cache: Arc<TranslationCache>,
    store: CacheStore,
    metrics: Arc<MetricsRegistry>,
    queue: Arc<BatchQueue>,
}

impl Engine {
    /// Build an engine for one of the remote providers. Must be called from
    /// inside a tokio runtime; background work is spawned onto it.
    pub fn new(config: EngineConfig) -> Result<Self, String> {
        let provider: Arc<dyn Translator> = match config.provider {
            ProviderKind::Libre => {
                Arc::new(LibreProvider::new(&config).map_err(|e| e.to_string())?)
            }
            ProviderKind::Deepl => {
                Arc::new(DeeplProvider::new(&config).map_err(|e| e.to_string())?)
            }
            ProviderKind::OnDevice => {
                return Err(
                    "on-device provider requires a local model, use Engine::with_local_model"
                        .to_string(),
                )
            }
        };
        Self::with_provider(config, provider)
    }

    /// Build an engine backed by the on-device model executor.
    pub fn with_local_model(
        config: EngineConfig,
        model: Arc<dyn LocalModel>,
    ) -> Result<Self, String> {
        let provider = Arc::new(OnDeviceProvider::new(
            model,
            config.source_lang.clone(),
            config.target_lang.clone(),
            config.local_deadline(),
        ));
        Self::with_provider(config, provider)
    }

    /// Build an engine around an arbitrary backend.
    pub fn with_provider(
        config: EngineConfig,
        provider: Arc<dyn Translator>,
    ) -> Result<Self, String> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| "engine must be created inside a tokio runtime".to_string())?;

        let pending = Arc::new(PendingSet::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let cache = Arc::new(TranslationCache::new(config.cache_capacity, config.caching));
        let store = CacheStore::open(&config.cache_dir, config.cache_invalidation_interval());
        store.load(&cache);

        let delivery = deliver::start(
            Arc::clone(&pending),
            Arc::clone(&metrics),
            config.post_translation_delay(),
            runtime.clone(),
        );
        let client = ProviderClient::new(
            provider,
            Arc::clone(&cache),
            &config,
            Arc::clone(&metrics),
        );
        let queue = BatchQueue::new(
            client,
            delivery,
            Arc::clone(&metrics),
            config.initial_batch_size,
            runtime,
        );

        info!(provider = ?config.provider, target = %config.target_lang, "engine started");
        Ok(Self {
            pending,
            cache,
            store,
            metrics,
            queue,
        })
    }

    /// Submit one text for translation. Returns false when an identical
    /// (caller, text) pair is already in flight; the duplicate is dropped
    /// and the earlier submission's result will serve both.
    pub fn submit(&self, text: impl Into<String>, caller: CallerRef, priority: i32) -> bool {
        self.submit_inner(text.into(), caller, priority, None, false)
    }

    /// Submit with a completion callback for callers without a UI target.
    /// The callback is only invoked for `CallerRef::Detached` callers; a
    /// `CallerRef::Ui` caller's result goes to its target (or is skipped when
    /// the target is gone) and the callback is ignored.
    pub fn submit_with_fallback(
        &self,
        text: impl Into<String>,
        caller: CallerRef,
        priority: i32,
        fallback: FallbackFn,
    ) -> bool {
        self.submit_inner(text.into(), caller, priority, Some(fallback), true)
    }

    fn submit_inner(
        &self,
        text: String,
        caller: CallerRef,
        priority: i32,
        fallback: Option<FallbackFn>,
        can_use_fallback: bool,
    ) -> bool {
        let request = TranslationRequest::new(text, caller, priority, fallback, can_use_fallback);
        if !self.pending.try_add(request.key.clone()) {
            self.metrics.incr(metric_names::DUPLICATE_DROPPED);
            debug!(text = %request.text, "duplicate request dropped");
            return false;
        }
        self.queue.enqueue(request);
        true
    }

    /// Force a drain of everything queued, regardless of batch triggers.
    pub fn flush(&self) {
        self.queue.flush();
    }

    /// Drop all cached translations, in memory and on disk, and record the
    /// invalidation time.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.store.invalidate();
        info!("translation cache cleared");
    }

    /// Write the cache snapshot to disk. Called on shutdown and whenever the
    /// host wants a durability point.
    pub fn persist_cache(&self) -> Result<(), String> {
        self.store.save(&self.cache)
    }

    /// Toggle result caching at runtime. Disabling drops in-memory entries.
    pub fn set_caching(&self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn queued_items(&self) -> usize {
        self.queue.queued_items()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn metrics_summary(&self) -> std::collections::HashMap<String, MetricSummary> {
        self.metrics.summary()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Persist the cache and log a final summary. The loop threads exit on
    /// their own once the engine (and with it every channel sender) drops.
    pub fn shutdown(&self) {
        if let Err(e) = self.persist_cache() {
            tracing::warn!(error = %e, "cache persist on shutdown failed");
        }
        info!(
            pending = self.pending.len(),
            cached = self.cache.len(),
            "engine shut down"
        );
    }
}
