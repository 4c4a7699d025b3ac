//! Translate protocol with a small worker-private cache

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{WorkerError, WorkerResult};
use crate::traits::{TaskProtocol, Translator};
use shared::messages::{decode_payload, encode_payload};
use shared::{process_debug, ProcessRole, TranslateReply, TranslateRequest, WorkerKind};

/// Backend timeout, longer on slower targets
pub fn default_translate_timeout() -> Duration {
    if cfg!(any(target_os = "android", target_arch = "arm")) {
        Duration::from_secs(20)
    } else {
        Duration::from_secs(10)
    }
}

#[derive(Debug, Clone)]
pub struct TranslateConfig {
    pub cache_ttl: Duration,
    /// Expired entries are swept once the cache grows past this size
    pub cache_soft_limit: usize,
    pub timeout: Duration,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            cache_soft_limit: 100,
            timeout: default_translate_timeout(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    translation: String,
    stored_at: Instant,
}

pub struct TranslateProtocol {
    translator: Arc<dyn Translator>,
    config: TranslateConfig,
    cache: HashMap<TranslateRequest, CacheEntry>,
}

impl TranslateProtocol {
    pub fn new(translator: Arc<dyn Translator>, config: TranslateConfig) -> Self {
        Self {
            translator,
            config,
            cache: HashMap::new(),
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn cached(&self, request: &TranslateRequest) -> Option<String> {
        self.cache
            .get(request)
            .filter(|entry| entry.stored_at.elapsed() < self.config.cache_ttl)
            .map(|entry| entry.translation.clone())
    }

    fn store(&mut self, request: TranslateRequest, translation: String) {
        self.cache.insert(
            request,
            CacheEntry {
                translation,
                stored_at: Instant::now(),
            },
        );

        if self.cache.len() > self.config.cache_soft_limit {
            let ttl = self.config.cache_ttl;
            let before = self.cache.len();
            self.cache.retain(|_, entry| entry.stored_at.elapsed() < ttl);
            process_debug!(
                ProcessRole::current(),
                "🧹 Translation cache swept {} expired entries",
                before - self.cache.len()
            );
        }
    }

    /// Translate with cache lookup and a bounded backend call
    pub async fn translate(&mut self, request: TranslateRequest) -> WorkerResult<String> {
        if let Some(hit) = self.cached(&request) {
            return Ok(hit);
        }

        let timeout = self.config.timeout;
        let translation = tokio::time::timeout(
            timeout,
            self.translator.translate(&request.text, &request.from, &request.to),
        )
        .await
        .map_err(|_| WorkerError::TranslationTimeout { timeout })??;

        self.store(request, translation.clone());
        Ok(translation)
    }
}

#[async_trait]
impl TaskProtocol for TranslateProtocol {
    fn kind(&self) -> WorkerKind {
        WorkerKind::TRANSLATE
    }

    async fn handle(&mut self, payload: serde_json::Value) -> WorkerResult<serde_json::Value> {
        let request: TranslateRequest = decode_payload(payload).map_err(WorkerError::invalid_payload)?;
        let translation = self.translate(request).await?;
        Ok(encode_payload(&TranslateReply { translation })?)
    }
}
