//! Result delivery loop.
//! A dedicated OS thread consumes completed items and applies each one to
//! its caller: mutate the UI target when it is still alive and the text
//! actually changed, otherwise invoke the caller's fallback. Every job,
//! success or failure, releases its pending key exactly once.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as cb;
use tracing::{debug, info};

use crate::metrics::{metric_names, MetricsRegistry};
use crate::pending::PendingSet;
use crate::request::{CallerRef, TranslationRequest};

/// One completed item heading back to its caller. `text` carries the
/// translated string on success and the original string on failure.
pub struct DeliveryJob {
    pub request: TranslationRequest,
    pub text: String,
    pub success: bool,
}

/// Sender half of the delivery loop. Cheap to clone; the loop thread exits
/// when every handle is dropped.
#[derive(Clone)]
pub struct DeliveryHandle {
    tx: cb::Sender<DeliveryJob>,
    delay: Duration,
    runtime: tokio::runtime::Handle,
}

impl DeliveryHandle {
    /// Queue a job for delivery, honoring the configured post-translation
    /// delay. The delay runs before the job is posted so the loop thread
    /// itself never sleeps.
    pub fn post(&self, job: DeliveryJob) {
        if self.delay.is_zero() {
            let _ = self.tx.send(job);
            return;
        }
        let tx = self.tx.clone();
        let delay = self.delay;
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(job);
        });
    }
}

/// Start the delivery loop thread and return its handle.
pub fn start(
    pending: Arc<PendingSet>,
    metrics: Arc<MetricsRegistry>,
    delay: Duration,
    runtime: tokio::runtime::Handle,
) -> DeliveryHandle {
    let (tx, rx) = cb::unbounded::<DeliveryJob>();

    std::thread::Builder::new()
        .name("result-delivery".into())
        .spawn(move || {
            for job in rx.iter() {
                apply(job, &pending, &metrics);
            }
            info!("delivery loop exiting (channel closed)");
        })
        .expect("failed to spawn delivery thread");

    DeliveryHandle { tx, delay, runtime }
}

fn apply(job: DeliveryJob, pending: &PendingSet, metrics: &Arc<MetricsRegistry>) {
    let latency_ms = job.request.enqueued_at.elapsed().as_secs_f64() * 1000.0;
    metrics.record_ms(metric_names::DELIVERY_LATENCY, latency_ms);
    if !job.success {
        metrics.incr(metric_names::ITEMS_FAILED);
    }

    match &job.request.caller {
        CallerRef::Ui(weak) => match weak.upgrade() {
            Some(target) => {
                // An empty result (the no-translation pass-through) must
                // never blank out whatever the element currently shows.
                if !job.text.is_empty() && target.displayed_text() != job.text {
                    target.set_text(&job.text);
                }
            }
            None => {
                debug!(request_id = %job.request.request_id, "target gone, skipping delivery");
            }
        },
        CallerRef::Detached(_) => {
            if job.request.can_use_fallback {
                if let Some(fallback) = &job.request.fallback {
                    fallback(&job.text);
                }
            }
        }
    }

    // Terminal in every branch: the key is released exactly once.
    pending.remove(&job.request.key);
}
