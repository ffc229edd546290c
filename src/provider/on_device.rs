//! On-device translation engine.
//! Model invocations are serialized on one dedicated OS thread; each call
//! carries an absolute deadline, after which the original text is returned
//! unchanged. This backend never surfaces a hard failure to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel as cb;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::{TranslateError, TranslatedItem, Translator};

/// Blocking local translation model. Implemented by the model-management
/// layer outside this crate.
pub trait LocalModel: Send + Sync {
    /// Translate one text. Blocking; called from the executor thread only.
    fn translate(&self, text: &str, source: Option<&str>, target: &str) -> Result<String, String>;
}

struct Job {
    text: String,
    reply: oneshot::Sender<Result<String, String>>,
}

pub struct OnDeviceProvider {
    job_tx: cb::Sender<Job>,
    deadline: Duration,
}

impl OnDeviceProvider {
    /// Spawn the single-thread model executor and return the provider handle.
    pub fn new(
        model: Arc<dyn LocalModel>,
        source_lang: Option<String>,
        target_lang: String,
        deadline: Duration,
    ) -> Self {
        let (job_tx, job_rx) = cb::unbounded::<Job>();

        std::thread::Builder::new()
            .name("local-translate".into())
            .spawn(move || {
                for job in job_rx.iter() {
                    let result = model.translate(&job.text, source_lang.as_deref(), &target_lang);
                    // Receiver gone means the deadline already fired.
                    let _ = job.reply.send(result);
                }
                info!("local model executor exiting (channel closed)");
            })
            .expect("failed to spawn local model executor thread");

        Self { job_tx, deadline }
    }
}

#[async_trait]
impl Translator for OnDeviceProvider {
    fn supports_batch(&self) -> bool {
        false
    }

    async fn translate(&self, texts: &[String]) -> Result<Vec<TranslatedItem>, TranslateError> {
        let text = match texts.first() {
            Some(text) => text.clone(),
            None => return Ok(Vec::new()),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .job_tx
            .send(Job {
                text: text.clone(),
                reply: reply_tx,
            })
            .is_err()
        {
            warn!("local model executor unavailable, returning original text");
            return Ok(vec![TranslatedItem {
                text,
                detected_lang: None,
            }]);
        }

        let translated = match tokio::time::timeout(self.deadline, reply_rx).await {
            Ok(Ok(Ok(translated))) => translated,
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "local model failed, returning original text");
                text.clone()
            }
            Ok(Err(_)) => {
                warn!("local model executor dropped reply, returning original text");
                text.clone()
            }
            Err(_) => {
                warn!(deadline_ms = self.deadline.as_millis() as u64, "local model deadline exceeded");
                text.clone()
            }
        };

        Ok(vec![TranslatedItem {
            text: translated,
            detected_lang: None,
        }])
    }
}
