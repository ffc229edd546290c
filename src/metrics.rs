//! Histogram metrics for the dispatch pipeline.
//! Tracks queue wait, extraction size, provider dispatch latency, cache
//! hit/miss counts, and delivery latency as p50/p95/p99 over a sample ring.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// Sliding window over the most recent samples of one metric.
struct Ring {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    /// Nearest-rank percentile over the retained window.
    fn percentile(&self, p: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
    }
}

/// Registry of named histograms plus monotonic counters.
pub struct MetricsRegistry {
    histograms: Mutex<HashMap<&'static str, Ring>>,
    counters: Mutex<HashMap<&'static str, u64>>,
    ring_capacity: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            histograms: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            ring_capacity: 512,
        }
    }

    /// Record one sample, in milliseconds, for the named histogram.
    pub fn record_ms(&self, name: &'static str, value_ms: f64) {
        let mut hists = self.histograms.lock();
        hists
            .entry(name)
            .or_insert_with(|| Ring::new(self.ring_capacity))
            .push(value_ms);
    }

    /// Bump a monotonic counter.
    pub fn incr(&self, name: &'static str) {
        *self.counters.lock().entry(name).or_insert(0) += 1;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// Percentile (0-100) for a histogram, in milliseconds.
    pub fn percentile_ms(&self, name: &str, p: f64) -> f64 {
        self.histograms
            .lock()
            .get(name)
            .map(|ring| ring.percentile(p))
            .unwrap_or(0.0)
    }

    /// Start a span that records elapsed milliseconds on finish.
    pub fn span(self: &Arc<Self>, name: &'static str) -> Span {
        Span {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    /// Snapshot all histograms at p50/p95/p99 plus counters.
    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        let hists = self.histograms.lock();
        let mut out = HashMap::new();
        for (&name, ring) in hists.iter() {
            out.insert(
                name.to_string(),
                MetricSummary {
                    p50_ms: ring.percentile(50.0),
                    p95_ms: ring.percentile(95.0),
                    p99_ms: ring.percentile(99.0),
                    count: ring.len(),
                },
            );
        }
        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing span recording on `finish`.
pub struct Span {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl Span {
    /// End the span, recording elapsed milliseconds. Returns the value.
    pub fn finish(self) -> f64 {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.registry.record_ms(self.name, elapsed_ms);
        elapsed_ms
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricSummary {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub count: usize,
}

/// Well-known metric names.
pub mod metric_names {
    pub const QUEUE_WAIT: &str = "queue_wait_ms";
    pub const BATCH_SIZE: &str = "batch_size";
    pub const DISPATCH_LATENCY: &str = "dispatch_latency_ms";
    pub const DELIVERY_LATENCY: &str = "delivery_latency_ms";
    pub const CACHE_HIT: &str = "cache_hit";
    pub const CACHE_MISS: &str = "cache_miss";
    pub const DUPLICATE_DROPPED: &str = "duplicate_dropped";
    pub const ITEMS_FAILED: &str = "items_failed";
}
