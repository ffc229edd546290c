//! Provider client: the boundary that turns extracted batches into delivery
//! jobs. Consults the result cache per item, skips texts already in the
//! target language, demotes multi-item batches for single-item providers,
//! and normalizes every failure into an original-text job so no error ever
//! crosses back to a caller.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{TranslatedItem, Translator};
use crate::cache::TranslationCache;
use crate::config::EngineConfig;
use crate::deliver::DeliveryJob;
use crate::lang;
use crate::metrics::{metric_names, MetricsRegistry};
use crate::request::TranslationRequest;

pub struct ProviderClient {
    provider: Arc<dyn Translator>,
    cache: Arc<TranslationCache>,
    source_lang: Option<String>,
    target_lang: String,
    batch_mode: bool,
    metrics: Arc<MetricsRegistry>,
}

impl ProviderClient {
    pub fn new(
        provider: Arc<dyn Translator>,
        cache: Arc<TranslationCache>,
        config: &EngineConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            provider,
            cache,
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
            batch_mode: config.batch_mode,
            metrics,
        }
    }

    /// Translate one extracted batch into per-item delivery jobs.
    /// Always returns exactly one job per request.
    pub async fn translate_batch(&self, requests: Vec<TranslationRequest>) -> Vec<DeliveryJob> {
        let mut jobs = Vec::with_capacity(requests.len());
        let mut misses = Vec::new();

        for request in requests {
            if let Some(hit) = self.cache.get(&request.text) {
                self.metrics.incr(metric_names::CACHE_HIT);
                jobs.push(DeliveryJob {
                    text: hit,
                    success: true,
                    request,
                });
            } else if self.source_lang.is_none()
                && lang::matches(&request.text, &self.target_lang)
            {
                // Already reads as the target language: implicit success,
                // never cached.
                debug!(text = %request.text, "source already in target language, skipping dispatch");
                jobs.push(DeliveryJob {
                    text: request.text.clone(),
                    success: true,
                    request,
                });
            } else {
                self.metrics.incr(metric_names::CACHE_MISS);
                misses.push(request);
            }
        }

        if misses.is_empty() {
            return jobs;
        }

        let batch_eligible =
            self.provider.supports_batch() && self.batch_mode && misses.len() > 1;
        if batch_eligible {
            self.dispatch_batched(misses, &mut jobs).await;
        } else {
            self.dispatch_single(misses, &mut jobs).await;
        }
        jobs
    }

    async fn dispatch_batched(
        &self,
        misses: Vec<TranslationRequest>,
        jobs: &mut Vec<DeliveryJob>,
    ) {
        let texts: Vec<String> = misses.iter().map(|r| r.text.clone()).collect();
        match self.provider.translate(&texts).await {
            Ok(items) => {
                if items.len() != misses.len() {
                    warn!(
                        sent = misses.len(),
                        received = items.len(),
                        "batch response length mismatch, processing matched prefix"
                    );
                }
                for (i, request) in misses.into_iter().enumerate() {
                    match items.get(i) {
                        Some(item) => jobs.push(self.resolve(request, item)),
                        None => jobs.push(failure(request)),
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, items = misses.len(), "batch dispatch failed");
                jobs.extend(misses.into_iter().map(failure));
            }
        }
    }

    /// Single-item dispatch. A multi-item batch reaching a single-only
    /// provider is demoted: the first item is translated, the remainder
    /// terminates through the failure path (keys released at delivery;
    /// fresh submissions re-enter the queue on their own).
    async fn dispatch_single(
        &self,
        misses: Vec<TranslationRequest>,
        jobs: &mut Vec<DeliveryJob>,
    ) {
        let mut iter = misses.into_iter();
        let first = match iter.next() {
            Some(first) => first,
            None => return,
        };

        match self.provider.translate(std::slice::from_ref(&first.text)).await {
            Ok(items) => match items.into_iter().next() {
                Some(item) => jobs.push(self.resolve(first, &item)),
                None => jobs.push(failure(first)),
            },
            Err(e) => {
                warn!(error = %e, "single dispatch failed");
                jobs.push(failure(first));
            }
        }

        for request in iter {
            jobs.push(failure(request));
        }
    }

    /// Turn one provider result into a delivery job, updating the cache for
    /// materially different translations.
    fn resolve(&self, request: TranslationRequest, item: &TranslatedItem) -> DeliveryJob {
        if item.detected_lang.as_deref() == Some(self.target_lang.as_str()) {
            // Source equals target: substitute the original, skip caching.
            return DeliveryJob {
                text: request.text.clone(),
                success: true,
                request,
            };
        }

        if item.text != request.text {
            self.cache.put(&request.text, &item.text);
        }
        DeliveryJob {
            text: item.text.clone(),
            success: true,
            request,
        }
    }
}

fn failure(request: TranslationRequest) -> DeliveryJob {
    DeliveryJob {
        text: request.text.clone(),
        success: false,
        request,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TranslateError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Uppercases every text; counts provider invocations.
    struct MockProvider {
        batch: bool,
        fail: bool,
        short_response: bool,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn new(batch: bool) -> Self {
            Self {
                batch,
                fail: false,
                short_response: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Translator for MockProvider {
        fn supports_batch(&self) -> bool {
            self.batch
        }

        async fn translate(
            &self,
            texts: &[String],
        ) -> Result<Vec<TranslatedItem>, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TranslateError::Timeout);
            }
            let mut items: Vec<TranslatedItem> = texts
                .iter()
                .map(|t| TranslatedItem {
                    text: t.to_uppercase(),
                    detected_lang: Some("xx".into()),
                })
                .collect();
            if self.short_response {
                items.pop();
            }
            Ok(items)
        }
    }

    fn client_with(provider: Arc<MockProvider>) -> (ProviderClient, Arc<TranslationCache>) {
        let cache = Arc::new(TranslationCache::new(32, true));
        let config = EngineConfig {
            target_lang: "fr".into(),
            ..EngineConfig::default()
        };
        let client = ProviderClient::new(
            provider,
            Arc::clone(&cache),
            &config,
            Arc::new(MetricsRegistry::new()),
        );
        (client, cache)
    }

    fn req(text: &str) -> TranslationRequest {
        TranslationRequest::new(
            text.to_string(),
            crate::request::CallerRef::Detached(1),
            0,
            None,
            false,
        )
    }

    #[tokio::test]
    async fn cache_hit_skips_provider() {
        let provider = Arc::new(MockProvider::new(true));
        let (client, cache) = client_with(Arc::clone(&provider));
        cache.put("bonjour le monde", "salut");

        let jobs = client.translate_batch(vec![req("bonjour le monde")]).await;
        assert_eq!(jobs[0].text, "salut");
        assert!(jobs[0].success);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_dispatch_uses_cache_not_network() {
        let provider = Arc::new(MockProvider::new(true));
        let (client, _cache) = client_with(Arc::clone(&provider));

        let first = client.translate_batch(vec![req("guten tag")]).await;
        let second = client.translate_batch(vec![req("guten tag")]).await;
        assert_eq!(first[0].text, second[0].text);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn detected_target_language_substitutes_original_and_skips_cache() {
        struct EchoFrench;
        #[async_trait]
        impl Translator for EchoFrench {
            fn supports_batch(&self) -> bool {
                true
            }
            async fn translate(
                &self,
                texts: &[String],
            ) -> Result<Vec<TranslatedItem>, TranslateError> {
                Ok(texts
                    .iter()
                    .map(|t| TranslatedItem {
                        text: format!("{t}-translated"),
                        detected_lang: Some("fr".into()),
                    })
                    .collect())
            }
        }

        let cache = Arc::new(TranslationCache::new(32, true));
        let config = EngineConfig {
            target_lang: "fr".into(),
            ..EngineConfig::default()
        };
        let client = ProviderClient::new(
            Arc::new(EchoFrench),
            Arc::clone(&cache),
            &config,
            Arc::new(MetricsRegistry::new()),
        );

        let jobs = client
            .translate_batch(vec![req("deja francais"), req("aussi francais")])
            .await;
        assert_eq!(jobs[0].text, "deja francais");
        assert!(jobs[0].success);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn shape_mismatch_degrades_tail_to_original() {
        let provider = Arc::new(MockProvider {
            short_response: true,
            ..MockProvider::new(true)
        });
        let (client, _cache) = client_with(provider);

        let jobs = client
            .translate_batch(vec![req("eins zwei"), req("drei vier"), req("funf sechs")])
            .await;
        assert_eq!(jobs.len(), 3);
        assert!(jobs[0].success);
        assert!(jobs[1].success);
        assert!(!jobs[2].success);
        assert_eq!(jobs[2].text, "funf sechs");
    }

    #[tokio::test]
    async fn provider_error_degrades_all_to_original() {
        let provider = Arc::new(MockProvider {
            fail: true,
            ..MockProvider::new(true)
        });
        let (client, cache) = client_with(provider);

        let jobs = client
            .translate_batch(vec![req("eins zwei"), req("drei vier")])
            .await;
        assert!(jobs.iter().all(|j| !j.success));
        assert_eq!(jobs[0].text, "eins zwei");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn multi_item_batch_is_demoted_for_single_providers() {
        let provider = Arc::new(MockProvider::new(false));
        let (client, _cache) = client_with(Arc::clone(&provider));

        let jobs = client
            .translate_batch(vec![req("eins zwei"), req("drei vier"), req("funf sechs")])
            .await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(jobs[0].success);
        assert_eq!(jobs[0].text, "EINS ZWEI");
        assert!(!jobs[1].success);
        assert!(!jobs[2].success);
    }
}
