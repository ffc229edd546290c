//! LibreTranslate-style single-item provider.
//! One POST per text, `{"translatedText": ...}` response, optional detected
//! source language when translating from auto.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, TranslateError, TranslatedItem, Translator};
use crate::config::EngineConfig;

pub struct LibreProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    source_lang: Option<String>,
    target_lang: String,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    translated_text: String,
    detected_language: Option<WireDetected>,
}

#[derive(Deserialize)]
struct WireDetected {
    language: String,
}

impl LibreProvider {
    pub fn new(config: &EngineConfig) -> Result<Self, TranslateError> {
        Ok(Self {
            http: http_client()?,
            endpoint: config.libre_endpoint.clone(),
            api_key: config.libre_api_key.clone(),
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
        })
    }
}

#[async_trait]
impl Translator for LibreProvider {
    fn supports_batch(&self) -> bool {
        false
    }

    async fn translate(&self, texts: &[String]) -> Result<Vec<TranslatedItem>, TranslateError> {
        // Hosted instances reject keyless requests; fail before the wire.
        if self.api_key.is_empty() && !self.endpoint.contains("127.0.0.1") {
            return Err(TranslateError::InvalidConfig("libre API key not set".into()));
        }

        let text = match texts.first() {
            Some(text) => text,
            None => return Ok(Vec::new()),
        };

        let body = WireRequest {
            q: text,
            source: self.source_lang.as_deref().unwrap_or("auto"),
            target: &self.target_lang,
            format: "text",
            api_key: (!self.api_key.is_empty()).then_some(self.api_key.as_str()),
        };

        let response = self
            .http
            .post(&self.endpoint)
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

        Ok(vec![TranslatedItem {
            text: parsed.translated_text,
            detected_lang: parsed
                .detected_language
                .map(|d| d.language.to_lowercase()),
        }])
    }
}
