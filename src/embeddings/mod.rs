// Embedding backends
// One implementation per backend behind a single provider trait; the
// backend is chosen once at construction time from configuration.

pub mod ollama;
pub mod openai;

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::{EmbeddingBackend, EmbeddingsConfig};
use crate::{KnowledgeError, Result};

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Turns text into fixed-length numeric vectors.
///
/// Implementations must return exactly one vector per input text, in
/// input order, and an empty result for an empty input. A failed call
/// returns no partial results.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()])?;
        vectors.pop().ok_or_else(|| {
            KnowledgeError::ResponseShape("provider returned no embedding for input".to_string())
        })
    }
}

/// Construct the embedding provider selected by configuration.
#[inline]
pub fn provider_from_config(config: &EmbeddingsConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.backend {
        EmbeddingBackend::Ollama => Ok(Box::new(OllamaClient::new(&config.ollama)?)),
        EmbeddingBackend::OpenAi => Ok(Box::new(OpenAiClient::new(&config.openai)?)),
    }
}

/// Issue an HTTP request with bounded retries and exponential backoff.
///
/// Transport failures and 5xx responses are retried; 4xx responses fail
/// immediately since the request itself is at fault.
pub(crate) fn request_with_retry<F>(retry_attempts: u32, mut request_fn: F) -> Result<String>
where
    F: FnMut() -> std::result::Result<String, ureq::Error>,
{
    let mut last_error = None;

    for attempt in 1..=retry_attempts {
        debug!("HTTP request attempt {}/{}", attempt, retry_attempts);

        match request_fn() {
            Ok(response_text) => return Ok(response_text),
            Err(error) => {
                let should_retry = match &error {
                    ureq::Error::StatusCode(status) => {
                        if *status >= 500 {
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, retry_attempts
                            );
                            true
                        } else {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(KnowledgeError::Transport(format!(
                                "client error: HTTP {status}"
                            )));
                        }
                    }
                    ureq::Error::ConnectionFailed
                    | ureq::Error::HostNotFound
                    | ureq::Error::Timeout(_)
                    | ureq::Error::Io(_) => {
                        warn!(
                            "Transport error: {}, attempt {}/{}",
                            error, attempt, retry_attempts
                        );
                        true
                    }
                    _ => {
                        warn!("Non-retryable error: {}", error);
                        false
                    }
                };

                if !should_retry {
                    return Err(KnowledgeError::Transport(format!(
                        "non-retryable error: {error}"
                    )));
                }

                last_error = Some(KnowledgeError::Transport(format!("request error: {error}")));

                if attempt < retry_attempts {
                    let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                    let delay = Duration::from_millis(delay_ms);
                    debug!("Waiting {:?} before retry", delay);
                    std::thread::sleep(delay);
                }
            }
        }
    }

    error!("All {} retry attempts failed", retry_attempts);

    Err(last_error
        .unwrap_or_else(|| KnowledgeError::Transport("request failed after retries".to_string())))
}

/// Truncate a raw payload for inclusion in error messages.
pub(crate) fn payload_snippet(raw: &str) -> String {
    const SNIPPET_CHARS: usize = 300;
    raw.chars().take(SNIPPET_CHARS).collect()
}
