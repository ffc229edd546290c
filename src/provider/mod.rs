//! Translation providers.
//! One trait, three backends: a local on-device model, a single-item HTTP
//! service, and a batch-capable HTTP service. Heterogeneous response shapes
//! are normalized into [`TranslatedItem`] before entering shared delivery
//! logic.

pub mod client;
pub mod deepl;
pub mod libre;
pub mod on_device;

use std::time::Duration;

use async_trait::async_trait;

pub use client::ProviderClient;
pub use deepl::DeeplProvider;
pub use libre::LibreProvider;
pub use on_device::{LocalModel, OnDeviceProvider};

/// Connect timeout for remote providers.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Overall request timeout (covers read/write).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One normalized translation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedItem {
    pub text: String,
    /// ISO 639-1 code the provider detected for the source, lowercase.
    pub detected_lang: Option<String>,
}

/// Backend adapter. `translate` receives one text for single-item providers
/// and the whole batch for batch-capable ones; results are positional.
#[async_trait]
pub trait Translator: Send + Sync {
    fn supports_batch(&self) -> bool;
    async fn translate(&self, texts: &[String]) -> Result<Vec<TranslatedItem>, TranslateError>;
}

#[derive(Debug)]
pub enum TranslateError {
    /// Network or HTTP-level failure.
    Api(String),
    /// Response body did not match the expected shape.
    Parse(String),
    /// Request exceeded its deadline.
    Timeout,
    /// Missing or invalid credentials; detected before any network call.
    InvalidConfig(String),
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslateError::Api(msg) => write!(f, "API error: {msg}"),
            TranslateError::Parse(msg) => write!(f, "response parse error: {msg}"),
            TranslateError::Timeout => write!(f, "translation timeout"),
            TranslateError::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

/// Pooled HTTP client shared by the remote providers.
pub(crate) fn http_client() -> Result<reqwest::Client, TranslateError> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| TranslateError::Api(e.to_string()))
}
