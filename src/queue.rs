//! Adaptive batch queue.
//! Producers enqueue without blocking; extraction and dispatch run as a
//! single-flight background cycle, triggered immediately by size/priority
//! or after a debounced adaptive timeout. Batch size self-tunes to observed
//! dispatch latency: fast networks get bigger batches, slow ones smaller.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{
    ADAPTIVE_BATCH_STEP, HIGH_PRIORITY_THRESHOLD, MAX_CHARS_PER_BATCH, MAX_DRAIN_CYCLES,
    MAX_FLUSH_DELAY_MS, MAX_ITEMS_PER_BATCH, MIN_ADAPTIVE_BATCH, MIN_FLUSH_DELAY_MS,
};
use crate::deliver::{DeliveryHandle, DeliveryJob};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::provider::ProviderClient;
use crate::request::TranslationRequest;

pub struct BatchQueue {
    queue: Mutex<VecDeque<TranslationRequest>>,
    item_count: AtomicUsize,
    char_count: AtomicUsize,
    /// Queued items at or above the high-priority threshold.
    high_count: AtomicUsize,
    /// Adaptive per-batch item limit.
    batch_size: AtomicUsize,
    /// Exponential moving average of dispatch latency; 0 means unseeded.
    avg_latency_ms: AtomicU64,
    /// Single-flight guard: one extraction/dispatch cycle at a time.
    drain_active: AtomicBool,
    /// Debounce slot for the scheduled delayed extraction.
    delayed: Mutex<Option<CancellationToken>>,
    client: ProviderClient,
    delivery: DeliveryHandle,
    metrics: Arc<MetricsRegistry>,
    runtime: tokio::runtime::Handle,
}

impl BatchQueue {
    pub fn new(
        client: ProviderClient,
        delivery: DeliveryHandle,
        metrics: Arc<MetricsRegistry>,
        initial_batch_size: usize,
        runtime: tokio::runtime::Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            item_count: AtomicUsize::new(0),
            char_count: AtomicUsize::new(0),
            high_count: AtomicUsize::new(0),
            batch_size: AtomicUsize::new(
                initial_batch_size.clamp(MIN_ADAPTIVE_BATCH, MAX_ITEMS_PER_BATCH),
            ),
            avg_latency_ms: AtomicU64::new(0),
            drain_active: AtomicBool::new(false),
            delayed: Mutex::new(None),
            client,
            delivery,
            metrics,
            runtime,
        })
    }

    /// Accept one request. Empty text is a no-translation shortcut handed
    /// straight to delivery; everything else is queued and either drained
    /// immediately or after the adaptive timeout.
    pub fn enqueue(self: &Arc<Self>, request: TranslationRequest) {
        if request.text.is_empty() {
            self.delivery.post(DeliveryJob {
                text: request.text.clone(),
                success: true,
                request,
            });
            return;
        }

        let chars = request.char_count();
        let high = request.priority >= HIGH_PRIORITY_THRESHOLD;
        // Counters lead the queue: extraction decrements only for items it
        // actually drained, so they must never lag behind an insert.
        let items = self.item_count.fetch_add(1, Ordering::SeqCst) + 1;
        let total_chars = self.char_count.fetch_add(chars, Ordering::SeqCst) + chars;
        if high {
            self.high_count.fetch_add(1, Ordering::SeqCst);
        }
        self.queue.lock().push_back(request);

        // high_count also covers previously queued high-priority items.
        let forced = items >= self.batch_size.load(Ordering::SeqCst)
            || total_chars >= MAX_CHARS_PER_BATCH
            || self.high_count.load(Ordering::SeqCst) > 0;

        if forced {
            self.spawn_drain(true);
        } else {
            self.schedule_delayed();
        }
    }

    /// Start a drain cycle unless one is already running. Forced drains
    /// repeat up to [`MAX_DRAIN_CYCLES`] extractions before yielding.
    fn spawn_drain(self: &Arc<Self>, forced: bool) {
        if let Some(token) = self.delayed.lock().take() {
            token.cancel();
        }
        if self.drain_active.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            let cycles = if forced { MAX_DRAIN_CYCLES } else { 1 };
            for _ in 0..cycles {
                let batch = this.extract_batch();
                if batch.is_empty() {
                    break;
                }
                this.dispatch(batch).await;
            }
            this.drain_active.store(false, Ordering::SeqCst);
            // A cycle that left items behind re-arms the delayed extraction.
            if this.item_count.load(Ordering::SeqCst) > 0 {
                this.schedule_delayed();
            }
        });
    }

    /// (Re)schedule a delayed extraction, cancelling any previous one so
    /// only the most recent enqueue's timeout governs.
    fn schedule_delayed(self: &Arc<Self>) {
        let token = CancellationToken::new();
        {
            let mut slot = self.delayed.lock();
            if let Some(previous) = slot.take() {
                previous.cancel();
            }
            *slot = Some(token.clone());
        }

        let delay = self.flush_delay();
        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    this.delayed.lock().take();
                    this.spawn_drain(false);
                }
            }
        });
    }

    /// Pop the next batch in FIFO order with high-priority items first,
    /// bounded by the adaptive item limit and the character cap. The first
    /// item that would overflow goes back to the front of the queue —
    /// unless the batch is still empty, in which case the oversized item is
    /// admitted alone so it can never starve.
    fn extract_batch(&self) -> Vec<TranslationRequest> {
        let mut queue = self.queue.lock();
        let take = queue.len().min(MAX_ITEMS_PER_BATCH);
        let candidates: Vec<TranslationRequest> = queue.drain(..take).collect();

        // Single coarse tier: high first, FIFO preserved within each tier.
        let mut ordered = Vec::with_capacity(candidates.len());
        let mut normal = Vec::new();
        for request in candidates {
            if request.priority >= HIGH_PRIORITY_THRESHOLD {
                ordered.push(request);
            } else {
                normal.push(request);
            }
        }
        ordered.extend(normal);

        let max_items = self.batch_size.load(Ordering::SeqCst);
        let mut batch: Vec<TranslationRequest> = Vec::new();
        let mut batch_chars = 0usize;
        let mut leftover = Vec::new();
        let mut iter = ordered.into_iter();

        for request in iter.by_ref() {
            let item_chars = request.char_count();
            let overflows =
                batch.len() >= max_items || batch_chars + item_chars > MAX_CHARS_PER_BATCH;
            if overflows {
                if batch.is_empty() {
                    batch_chars += item_chars;
                    batch.push(request);
                } else {
                    leftover.push(request);
                }
                break;
            }
            batch_chars += item_chars;
            batch.push(request);
        }

        leftover.extend(iter);
        for request in leftover.into_iter().rev() {
            queue.push_front(request);
        }

        self.item_count.fetch_sub(batch.len(), Ordering::SeqCst);
        self.char_count.fetch_sub(batch_chars, Ordering::SeqCst);
        let high_extracted = batch
            .iter()
            .filter(|r| r.priority >= HIGH_PRIORITY_THRESHOLD)
            .count();
        if high_extracted > 0 {
            self.high_count.fetch_sub(high_extracted, Ordering::SeqCst);
        }

        batch
    }

    async fn dispatch(&self, batch: Vec<TranslationRequest>) {
        let batch_id = uuid::Uuid::new_v4();
        for request in &batch {
            self.metrics.record_ms(
                metric_names::QUEUE_WAIT,
                request.enqueued_at.elapsed().as_secs_f64() * 1000.0,
            );
        }
        self.metrics
            .record_ms(metric_names::BATCH_SIZE, batch.len() as f64);
        debug!(batch_id = %batch_id, items = batch.len(), "dispatching batch");

        let span = self.metrics.span(metric_names::DISPATCH_LATENCY);
        let jobs = self.client.translate_batch(batch).await;
        let elapsed_ms = span.finish();
        self.adapt(elapsed_ms);

        for job in jobs {
            self.delivery.post(job);
        }
    }

    /// Fold one dispatch latency sample into the moving average, then grow
    /// or shrink the batch size: fast and low-latency conditions raise it,
    /// slow or high-latency conditions lower it.
    fn adapt(&self, sample_ms: f64) {
        let sample = sample_ms as u64;
        let prev = self.avg_latency_ms.load(Ordering::SeqCst);
        let avg = if prev == 0 {
            sample.max(1)
        } else {
            ((prev * 7 + sample * 3) / 10).max(1)
        };
        self.avg_latency_ms.store(avg, Ordering::SeqCst);

        let size = self.batch_size.load(Ordering::SeqCst);
        if sample_ms < 100.0 && avg < 800 {
            self.batch_size
                .store((size + ADAPTIVE_BATCH_STEP).min(MAX_ITEMS_PER_BATCH), Ordering::SeqCst);
        } else if sample_ms > 500.0 || avg > 2000 {
            self.batch_size.store(
                size.saturating_sub(ADAPTIVE_BATCH_STEP).max(MIN_ADAPTIVE_BATCH),
                Ordering::SeqCst,
            );
        }
    }

    /// Adaptive wait before a timed extraction: 200 ms when recent dispatch
    /// latency is at or under 200 ms, 2000 ms at or above 3000 ms, linear in
    /// between.
    fn flush_delay(&self) -> Duration {
        let avg = self.avg_latency_ms.load(Ordering::SeqCst);
        if avg == 0 {
            return Duration::from_millis(MIN_FLUSH_DELAY_MS);
        }
        let clamped = avg.clamp(200, 3000);
        let span = MAX_FLUSH_DELAY_MS - MIN_FLUSH_DELAY_MS;
        Duration::from_millis(MIN_FLUSH_DELAY_MS + (clamped - 200) * span / 2800)
    }

    /// Force a full drain now, regardless of size or priority triggers.
    pub fn flush(self: &Arc<Self>) {
        self.spawn_drain(true);
    }

    pub fn queued_items(&self) -> usize {
        self.item_count.load(Ordering::SeqCst)
    }

    pub fn current_batch_size(&self) -> usize {
        self.batch_size.load(Ordering::SeqCst)
    }

    pub fn average_latency_ms(&self) -> u64 {
        self.avg_latency_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TranslationCache;
    use crate::config::EngineConfig;
    use crate::pending::PendingSet;
    use crate::provider::{TranslateError, TranslatedItem, Translator};
    use crate::request::CallerRef;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct UppercaseProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translator for UppercaseProvider {
        fn supports_batch(&self) -> bool {
            true
        }
        async fn translate(
            &self,
            texts: &[String],
        ) -> Result<Vec<TranslatedItem>, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| TranslatedItem {
                    text: t.to_uppercase(),
                    detected_lang: Some("xx".into()),
                })
                .collect())
        }
    }

    fn build_queue() -> (Arc<BatchQueue>, Arc<PendingSet>) {
        let metrics = Arc::new(MetricsRegistry::new());
        let pending = Arc::new(PendingSet::new());
        let delivery = crate::deliver::start(
            Arc::clone(&pending),
            Arc::clone(&metrics),
            Duration::ZERO,
            tokio::runtime::Handle::current(),
        );
        let config = EngineConfig {
            target_lang: "fr".into(),
            ..EngineConfig::default()
        };
        let client = ProviderClient::new(
            Arc::new(UppercaseProvider {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(TranslationCache::new(64, true)),
            &config,
            Arc::clone(&metrics),
        );
        let queue = BatchQueue::new(
            client,
            delivery,
            metrics,
            20,
            tokio::runtime::Handle::current(),
        );
        (queue, pending)
    }

    fn req(text: &str, priority: i32) -> TranslationRequest {
        TranslationRequest::new(
            text.to_string(),
            CallerRef::Detached(text.as_ptr() as u64),
            priority,
            None,
            false,
        )
    }

    fn fill_direct(queue: &Arc<BatchQueue>, requests: Vec<TranslationRequest>) {
        // Bypass enqueue triggers so extraction can be tested in isolation.
        for request in requests {
            let chars = request.char_count();
            let high = request.priority >= HIGH_PRIORITY_THRESHOLD;
            queue.queue.lock().push_back(request);
            queue.item_count.fetch_add(1, Ordering::SeqCst);
            queue.char_count.fetch_add(chars, Ordering::SeqCst);
            if high {
                queue.high_count.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn extraction_respects_item_limit_and_fifo() {
        let (queue, _) = build_queue();
        let requests: Vec<_> = (0..30).map(|i| req(&format!("text {i}"), 0)).collect();
        fill_direct(&queue, requests);

        let batch = queue.extract_batch();
        assert_eq!(batch.len(), 20);
        assert_eq!(batch[0].text, "text 0");
        assert_eq!(batch[19].text, "text 19");
        assert_eq!(queue.queued_items(), 10);

        let rest = queue.extract_batch();
        assert_eq!(rest.len(), 10);
        assert_eq!(rest[0].text, "text 20");
    }

    #[tokio::test]
    async fn high_priority_items_lead_the_batch() {
        let (queue, _) = build_queue();
        fill_direct(
            &queue,
            vec![
                req("normal one", 0),
                req("urgent", HIGH_PRIORITY_THRESHOLD),
                req("normal two", 0),
            ],
        );

        let batch = queue.extract_batch();
        assert_eq!(batch[0].text, "urgent");
        assert_eq!(batch[1].text, "normal one");
        assert_eq!(batch[2].text, "normal two");
    }

    #[tokio::test]
    async fn char_cap_pushes_overflow_back() {
        let (queue, _) = build_queue();
        let big = "x".repeat(MAX_CHARS_PER_BATCH - 10);
        fill_direct(&queue, vec![req(&big, 0), req("small but over the cap", 0)]);

        let batch = queue.extract_batch();
        assert_eq!(batch.len(), 1);
        assert_eq!(queue.queued_items(), 1);

        let next = queue.extract_batch();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].text, "small but over the cap");
    }

    #[tokio::test]
    async fn oversized_singleton_is_admitted_alone() {
        let (queue, _) = build_queue();
        let oversized = "y".repeat(MAX_CHARS_PER_BATCH + 500);
        fill_direct(&queue, vec![req(&oversized, 0), req("trailing", 0)]);

        let batch = queue.extract_batch();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].char_count(), MAX_CHARS_PER_BATCH + 500);
        assert_eq!(queue.queued_items(), 1);
    }

    #[tokio::test]
    async fn burst_extracts_into_bounded_batches() {
        let (queue, _) = build_queue();
        let requests: Vec<_> = (0..150).map(|i| req(&format!("item {i}"), 0)).collect();
        fill_direct(&queue, requests);

        let mut batches = Vec::new();
        loop {
            let batch = queue.extract_batch();
            if batch.is_empty() {
                break;
            }
            assert!(batch.len() <= MAX_ITEMS_PER_BATCH);
            let chars: usize = batch.iter().map(|r| r.char_count()).sum();
            assert!(chars <= MAX_CHARS_PER_BATCH || batch.len() == 1);
            batches.push(batch);
        }
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 150);
        assert!(batches.len() >= 150 / MAX_ITEMS_PER_BATCH);
    }

    #[tokio::test]
    async fn adapt_grows_on_fast_dispatch_and_shrinks_on_slow() {
        let (queue, _) = build_queue();
        let start = queue.current_batch_size();

        queue.adapt(50.0);
        assert_eq!(queue.current_batch_size(), start + ADAPTIVE_BATCH_STEP);

        // Repeated slow samples push the EMA up and shrink the size to its floor.
        for _ in 0..40 {
            queue.adapt(3000.0);
        }
        assert_eq!(queue.current_batch_size(), MIN_ADAPTIVE_BATCH);
        assert!(queue.average_latency_ms() > 2000);
    }

    #[tokio::test]
    async fn flush_delay_interpolates_between_bounds() {
        let (queue, _) = build_queue();
        assert_eq!(
            queue.flush_delay(),
            Duration::from_millis(MIN_FLUSH_DELAY_MS)
        );

        queue.avg_latency_ms.store(100, Ordering::SeqCst);
        assert_eq!(
            queue.flush_delay(),
            Duration::from_millis(MIN_FLUSH_DELAY_MS)
        );

        queue.avg_latency_ms.store(5000, Ordering::SeqCst);
        assert_eq!(
            queue.flush_delay(),
            Duration::from_millis(MAX_FLUSH_DELAY_MS)
        );

        queue.avg_latency_ms.store(1600, Ordering::SeqCst);
        let mid = queue.flush_delay().as_millis() as u64;
        assert!(mid > MIN_FLUSH_DELAY_MS && mid < MAX_FLUSH_DELAY_MS);
    }

    #[tokio::test]
    async fn high_priority_enqueue_drains_immediately() {
        let (queue, pending) = build_queue();
        let request = req("dringend bitte sofort", HIGH_PRIORITY_THRESHOLD);
        pending.try_add(request.key.clone());
        queue.enqueue(request);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(queue.queued_items(), 0);
        // Delivered and released.
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn low_priority_enqueue_flushes_after_timeout() {
        let (queue, pending) = build_queue();
        let request = req("ganz normal", 0);
        pending.try_add(request.key.clone());
        queue.enqueue(request);

        // Still queued before the 200 ms adaptive floor elapses.
        assert_eq!(queue.queued_items(), 1);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(queue.queued_items(), 0);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn rescheduling_cancels_the_previous_delayed_extraction() {
        let (queue, pending) = build_queue();
        let first = req("erste zeile", 0);
        pending.try_add(first.key.clone());
        queue.enqueue(first);

        // Re-arm the timer just before the first one would fire.
        tokio::time::sleep(Duration::from_millis(120)).await;
        let second = req("zweite zeile", 0);
        pending.try_add(second.key.clone());
        queue.enqueue(second);

        // 260 ms after the first enqueue its own timer would have fired.
        // Only the second enqueue's timer governs, so nothing has drained.
        tokio::time::sleep(Duration::from_millis(140)).await;
        assert_eq!(queue.queued_items(), 2);

        // The rescheduled timer flushes everything.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(queue.queued_items(), 0);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn queued_high_priority_item_forces_the_next_enqueue_to_drain() {
        let (queue, pending) = build_queue();
        // A high-priority item already sitting in the queue.
        fill_direct(&queue, vec![req("wichtig", HIGH_PRIORITY_THRESHOLD)]);

        let follower = req("unwichtig", 0);
        pending.try_add(follower.key.clone());
        queue.enqueue(follower);

        // Drained well before the 200 ms delayed-extraction floor.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(queue.queued_items(), 0);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn empty_text_bypasses_the_queue() {
        let (queue, pending) = build_queue();
        let request = req("", 0);
        pending.try_add(request.key.clone());
        queue.enqueue(request);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(queue.queued_items(), 0);
        assert!(pending.is_empty());
    }
}
