#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS, EmbeddingProvider, payload_snippet,
    request_with_retry,
};
use crate::config::OpenAiConfig;
use crate::{KnowledgeError, Result};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

/// Embedding backend for the OpenAI embeddings API.
///
/// Requests are issued in fixed-size batches; ordering across batches
/// follows input order. A failure in any batch fails the whole call with
/// no partial results.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    endpoint: Url,
    model: String,
    api_key: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                KnowledgeError::Config(
                    "OpenAI embeddings require an API key; set openai.api_key in the config \
                     or the OPENAI_API_KEY environment variable"
                        .to_string(),
                )
            })?;

        let endpoint = config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let endpoint = Url::parse(endpoint)
            .map_err(|e| KnowledgeError::Config(format!("invalid OpenAI endpoint: {e}")))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            endpoint,
            model: config.model.clone(),
            api_key,
            batch_size: config.batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };
        let request_json = serde_json::to_string(&request).map_err(|e| {
            KnowledgeError::Other(anyhow::anyhow!("failed to serialize embeddings request: {e}"))
        })?;

        let response_text = request_with_retry(self.retry_attempts, || {
            self.agent
                .post(self.endpoint.as_str())
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: EmbeddingsResponse = serde_json::from_str(&response_text).map_err(|e| {
            KnowledgeError::ResponseShape(format!(
                "failed to parse embeddings response: {e}: {}",
                payload_snippet(&response_text)
            ))
        })?;

        if response.data.len() != texts.len() {
            return Err(KnowledgeError::ResponseShape(format!(
                "mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            )));
        }

        // The API tags each embedding with its input index; sort to
        // guarantee input order regardless of response order.
        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

impl EmbeddingProvider for OpenAiClient {
    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Generating OpenAI embeddings for {} texts in batches of {}",
            texts.len(),
            self.batch_size
        );

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            results.extend(self.embed_batch(batch)?);
        }

        Ok(results)
    }
}
