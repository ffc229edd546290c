//! Translation request and caller-target types.
//! The caller handle is non-owning: a pending translation never extends the
//! lifetime of the UI element that asked for it.

use std::sync::{Arc, Weak};
use std::time::Instant;

/// Caller-supplied completion callback, invoked with the translated text on
/// success or the original text on failure.
pub type FallbackFn = Arc<dyn Fn(&str) + Send + Sync>;

/// A UI element that can receive a translated text. Implemented by the
/// hooking layer outside this crate.
pub trait TranslationTarget: Send + Sync {
    /// Text currently displayed by the element.
    fn displayed_text(&self) -> String;
    /// Replace the displayed text.
    fn set_text(&self, text: &str);
}

/// Non-owning reference to the requesting caller, resolved only at delivery.
#[derive(Clone)]
pub enum CallerRef {
    /// UI element, held weakly. Gone at delivery time means a silent skip.
    Ui(Weak<dyn TranslationTarget>),
    /// Caller without a UI target, identified explicitly.
    Detached(u64),
}

impl CallerRef {
    /// Stable identity for dedup keying. Ui targets use their allocation
    /// address; detached callers supply their own id.
    pub fn id(&self) -> u64 {
        match self {
            CallerRef::Ui(weak) => Weak::as_ptr(weak) as *const () as usize as u64,
            CallerRef::Detached(id) => *id,
        }
    }

    pub fn ui(target: &Arc<dyn TranslationTarget>) -> Self {
        CallerRef::Ui(Arc::downgrade(target))
    }
}

impl std::fmt::Debug for CallerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallerRef::Ui(_) => write!(f, "CallerRef::Ui({:#x})", self.id()),
            CallerRef::Detached(id) => write!(f, "CallerRef::Detached({id})"),
        }
    }
}

/// Exact composite dedup key: caller identity plus source text.
/// Deliberately not a hash — a collision would silently drop an unrelated
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub caller_id: u64,
    pub text: String,
}

impl PendingKey {
    pub fn new(caller: &CallerRef, text: &str) -> Self {
        Self {
            caller_id: caller.id(),
            text: text.to_string(),
        }
    }
}

/// One queued translation request. Created at submission, consumed by batch
/// extraction.
pub struct TranslationRequest {
    pub request_id: String,
    pub text: String,
    pub caller: CallerRef,
    pub priority: i32,
    pub key: PendingKey,
    pub fallback: Option<FallbackFn>,
    pub can_use_fallback: bool,
    pub enqueued_at: Instant,
}

impl TranslationRequest {
    pub fn new(
        text: String,
        caller: CallerRef,
        priority: i32,
        fallback: Option<FallbackFn>,
        can_use_fallback: bool,
    ) -> Self {
        let key = PendingKey::new(&caller, &text);
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            text,
            caller,
            priority,
            key,
            fallback,
            can_use_fallback,
            enqueued_at: Instant::now(),
        }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

impl std::fmt::Debug for TranslationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationRequest")
            .field("request_id", &self.request_id)
            .field("text", &self.text)
            .field("priority", &self.priority)
            .finish()
    }
}
