//! Babelflow: on-demand, deduplicated, batched translation dispatch.
//! Callers submit texts as they appear; the engine coalesces them into
//! adaptively sized batches, dispatches to the configured provider, caches
//! results, and delivers asynchronously back to whichever caller is still
//! alive.

pub mod cache;
pub mod config;
pub mod deliver;
pub mod engine;
pub mod lang;
pub mod metrics;
pub mod pending;
pub mod persist;
pub mod provider;
pub mod queue;
pub mod request;

pub use cache::TranslationCache;
pub use config::{EngineConfig, ProviderKind, SourceFlags};
pub use engine::Engine;
pub use metrics::{MetricSummary, MetricsRegistry};
pub use provider::{LocalModel, TranslateError, TranslatedItem, Translator};
pub use request::{CallerRef, FallbackFn, TranslationTarget};
