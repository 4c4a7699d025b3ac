//! HTTP translation backend

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};
use crate::traits::Translator;

const DEFAULT_BASE_URL: &str = "https://translate.googleapis.com";

/// Client for the public `translate_a/single` endpoint
#[derive(Clone)]
pub struct GoogleTranslator {
    base_url: String,
    client: reqwest::Client,
}

impl GoogleTranslator {
    pub fn new(timeout: Duration) -> WorkerResult<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    /// Point the client at another host (used by tests and proxies)
    pub fn with_base_url(base_url: &str, timeout: Duration) -> WorkerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkerError::translation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, from: &str, to: &str) -> WorkerResult<String> {
        let url = format!("{}/translate_a/single", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("client", "gtx"), ("sl", from), ("tl", to), ("dt", "t"), ("q", text)])
            .send()
            .await
            .map_err(|e| WorkerError::translation(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WorkerError::translation(format!("HTTP {}", response.status())));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| WorkerError::translation(format!("Failed to parse response: {e}")))?;

        join_sentences(&body)
    }
}

/// The endpoint answers with `[[["<translated>", "<source>", ...], ...], ...]`;
/// the translation is the concatenation of the first element of each sentence.
fn join_sentences(body: &serde_json::Value) -> WorkerResult<String> {
    let sentences = body
        .get(0)
        .and_then(|s| s.as_array())
        .ok_or_else(|| WorkerError::translation("No sentences in response"))?;

    let translation: String = sentences
        .iter()
        .filter_map(|sentence| sentence.get(0).and_then(|part| part.as_str()))
        .collect();

    if translation.is_empty() && !sentences.is_empty() {
        return Err(WorkerError::translation("Empty translation in response"));
    }
    Ok(translation)
}
