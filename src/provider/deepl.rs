//! DeepL-style batch-capable provider.
//! JSON array of texts in, array of structured results (with detected source
//! language) out, matched positionally. Batches larger than ten entries are
//! decoded on the rayon pool; smaller ones sequentially. Both paths produce
//! identical output.

use async_trait::async_trait;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{http_client, TranslateError, TranslatedItem, Translator};
use crate::config::EngineConfig;

/// Entry count above which response decoding goes parallel.
const PARALLEL_DECODE_THRESHOLD: usize = 10;

pub struct DeeplProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    source_lang: Option<String>,
    target_lang: String,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    text: &'a [String],
    target_lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<String>,
}

#[derive(Deserialize)]
struct WireResponse {
    translations: Vec<WireTranslation>,
}

#[derive(Deserialize)]
struct WireTranslation {
    detected_source_language: Option<String>,
    text: String,
}

impl DeeplProvider {
    pub fn new(config: &EngineConfig) -> Result<Self, TranslateError> {
        Ok(Self {
            http: http_client()?,
            endpoint: config.deepl_endpoint.clone(),
            api_key: config.deepl_api_key.clone(),
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
        })
    }
}

#[async_trait]
impl Translator for DeeplProvider {
    fn supports_batch(&self) -> bool {
        true
    }

    async fn translate(&self, texts: &[String]) -> Result<Vec<TranslatedItem>, TranslateError> {
        if self.api_key.is_empty() {
            return Err(TranslateError::InvalidConfig("deepl API key not set".into()));
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = WireRequest {
            text: texts,
            target_lang: self.target_lang.to_uppercase(),
            source_lang: self.source_lang.as_ref().map(|l| l.to_uppercase()),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header(
                "Authorization",
                format!("DeepL-Auth-Key {}", self.api_key),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranslateError::Timeout
                } else {
                    TranslateError::Api(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(TranslateError::Api(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Parse(e.to_string()))?;

        Ok(decode(parsed.translations))
    }
}

/// Normalize wire entries into [`TranslatedItem`]s, picking the parallel
/// path above [`PARALLEL_DECODE_THRESHOLD`] entries.
fn decode(entries: Vec<WireTranslation>) -> Vec<TranslatedItem> {
    if entries.len() > PARALLEL_DECODE_THRESHOLD {
        decode_parallel(entries)
    } else {
        decode_sequential(entries)
    }
}

fn decode_sequential(entries: Vec<WireTranslation>) -> Vec<TranslatedItem> {
    entries.into_iter().map(normalize_entry).collect()
}

fn decode_parallel(entries: Vec<WireTranslation>) -> Vec<TranslatedItem> {
    entries.into_par_iter().map(normalize_entry).collect()
}

fn normalize_entry(entry: WireTranslation) -> TranslatedItem {
    TranslatedItem {
        text: entry.text.trim().to_string(),
        detected_lang: entry
            .detected_source_language
            .map(|lang| lang.trim().to_lowercase()),
    }
}
