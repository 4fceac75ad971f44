
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS, EmbeddingProvider, payload_snippet,
    request_with_retry,
};
use crate::config::OllamaConfig;
use crate::{KnowledgeError, Result};

/// Embedding backend for a locally-hosted model server (Ollama).
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    model: String,
    #[serde(rename = "input")]
    inputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .server_url()
            .map_err(|e| KnowledgeError::Config(format!("invalid Ollama server URL: {e}")))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: config.batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Check that the server is reachable and the configured model is
    /// available.
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models()?;
        if models.iter().any(|m| m.name == self.model) {
            info!(
                "Health check passed for Ollama server at {} with model {}",
                self.base_url, self.model
            );
            Ok(())
        } else {
            let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available
            );
            Err(KnowledgeError::Config(format!(
                "model '{}' is not available. Available models: {:?}",
                self.model, available
            )))
        }
    }

    /// List all models available on the server
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .map_err(|e| KnowledgeError::Config(format!("failed to build models URL: {e}")))?;

        debug!("Fetching available models from {}", url);

        let response_text = request_with_retry(self.retry_attempts, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let models_response: ModelsResponse = serde_json::from_str(&response_text).map_err(|e| {
            KnowledgeError::ResponseShape(format!(
                "failed to parse models response: {e}: {}",
                payload_snippet(&response_text)
            ))
        })?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };
        let response_text = self.post_embed(&serde_json::to_string(&request).map_err(|e| {
            KnowledgeError::Other(anyhow::anyhow!("failed to serialize embed request: {e}"))
        })?)?;

        let embed_response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            KnowledgeError::ResponseShape(format!(
                "failed to parse embedding response: {e}: {}",
                payload_snippet(&response_text)
            ))
        })?;

        Ok(embed_response.embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.len() == 1 {
            return Ok(vec![self.embed_one(&texts[0])?]);
        }

        let request = BatchEmbedRequest {
            model: self.model.clone(),
            inputs: texts.to_vec(),
        };
        let response_text = self.post_embed(&serde_json::to_string(&request).map_err(|e| {
            KnowledgeError::Other(anyhow::anyhow!("failed to serialize batch request: {e}"))
        })?)?;

        let batch_response: BatchEmbedResponse =
            serde_json::from_str(&response_text).map_err(|e| {
                KnowledgeError::ResponseShape(format!(
                    "failed to parse batch embedding response: {e}: {}",
                    payload_snippet(&response_text)
                ))
            })?;

        if batch_response.embeddings.len() != texts.len() {
            return Err(KnowledgeError::ResponseShape(format!(
                "mismatch between request and response counts: {} vs {}",
                texts.len(),
                batch_response.embeddings.len()
            )));
        }

        Ok(batch_response.embeddings)
    }

    fn post_embed(&self, request_json: &str) -> Result<String> {
        let url = self
            .base_url
            .join("/api/embed")
            .map_err(|e| KnowledgeError::Config(format!("failed to build embedding URL: {e}")))?;

        request_with_retry(self.retry_attempts, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }
}

impl EmbeddingProvider for OllamaClient {
    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            results.extend(self.embed_batch(batch)?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }
}
