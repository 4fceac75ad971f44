// Completion provider client
// One client over several vendor response shapes; normalization is a
// prioritized list of typed shape parsers rather than ad hoc field
// probing.


use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{LlmConfig, LlmProviderKind, PayloadStyle};
use crate::{KnowledgeError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_RETRIES: u32 = 2;
const BACKOFF_MILLIS: u64 = 1500;

/// Client for chat-completion providers with differing request and
/// response shapes.
pub struct LlmClient {
    provider: Provider,
    agent: ureq::Agent,
    retries: u32,
}

enum Provider {
    Free {
        base_url: String,
        payload_style: PayloadStyle,
    },
    Gemini {
        model: String,
        api_key: String,
        endpoint_base: String,
    },
}

impl LlmClient {
    #[inline]
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let provider = match config.provider {
            LlmProviderKind::Free => Provider::Free {
                base_url: config.base_url.clone(),
                payload_style: config.payload_style,
            },
            LlmProviderKind::Gemini => {
                let api_key = config
                    .gemini_api_key
                    .clone()
                    .or_else(|| std::env::var("GEMINI_API_KEY").ok())
                    .ok_or_else(|| {
                        KnowledgeError::Config(
                            "Gemini completions require an API key; set llm.gemini_api_key in \
                             the config or the GEMINI_API_KEY environment variable"
                                .to_string(),
                        )
                    })?;
                Provider::Gemini {
                    model: config.gemini_model.clone(),
                    api_key,
                    endpoint_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                }
            }
        };

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            provider,
            agent,
            retries: DEFAULT_RETRIES,
        })
    }

    #[inline]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[cfg(test)]
    fn with_gemini_endpoint_base(mut self, base: &str) -> Self {
        if let Provider::Gemini { endpoint_base, .. } = &mut self.provider {
            *endpoint_base = base.to_string();
        }
        self
    }

    /// Send a completion request and return the normalized answer text.
    #[inline]
    pub fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let (url, body) = match &self.provider {
            Provider::Free {
                base_url,
                payload_style,
            } => (base_url.clone(), free_payload(prompt, system, *payload_style)),
            Provider::Gemini {
                model,
                api_key,
                endpoint_base,
            } => (
                format!("{endpoint_base}/models/{model}:generateContent?key={api_key}"),
                gemini_payload(prompt, system),
            ),
        };

        let raw = self.post_with_retry(&url, &body)?;
        extract_completion(&raw)
    }

    /// POST the payload, retrying transport failures with backoff.
    /// Application errors (non-2xx) are never retried.
    fn post_with_retry(&self, url: &str, body: &Value) -> Result<String> {
        let body_json = body.to_string();
        let mut last_error = None;

        for attempt in 0..=self.retries {
            let result = self
                .agent
                .post(url)
                .header("Content-Type", "application/json")
                .send(&body_json)
                .and_then(|mut resp| resp.body_mut().read_to_string());

            match result {
                Ok(raw) => return Ok(raw),
                Err(ureq::Error::StatusCode(status)) => {
                    return Err(KnowledgeError::Transport(format!(
                        "completion provider returned HTTP {status}"
                    )));
                }
                Err(error) => {
                    warn!(
                        "Completion request failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.retries + 1,
                        error
                    );
                    last_error =
                        Some(KnowledgeError::Transport(format!("request error: {error}")));
                    if attempt < self.retries {
                        let delay = Duration::from_millis(BACKOFF_MILLIS * u64::from(attempt + 1));
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            KnowledgeError::Transport("completion request failed after retries".to_string())
        }))
    }
}

fn free_payload(prompt: &str, system: Option<&str>, style: PayloadStyle) -> Value {
    let system_text = system.map(str::trim).filter(|s| !s.is_empty());

    match style {
        PayloadStyle::Messages => {
            let mut messages = Vec::new();
            if let Some(system_text) = system_text {
                messages.push(serde_json::json!({ "role": "system", "content": system_text }));
            }
            messages.push(serde_json::json!({ "role": "user", "content": prompt }));
            serde_json::json!({ "messages": messages })
        }
        PayloadStyle::Message => {
            let message = match system_text {
                Some(system_text) => format!("{system_text}\n\n{prompt}"),
                None => prompt.to_string(),
            };
            serde_json::json!({ "message": message })
        }
    }
}

fn gemini_payload(prompt: &str, system: Option<&str>) -> Value {
    let mut body = serde_json::json!({
        "contents": [
            { "role": "user", "parts": [{ "text": prompt }] }
        ]
    });
    if let Some(system_text) = system.map(str::trim).filter(|s| !s.is_empty()) {
        body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system_text }] });
    }
    body
}

// Known response shapes, tried in priority order.

#[derive(Debug, Deserialize)]
struct StatusShape {
    status: String,
    response: Option<String>,
    message: Option<String>,
    output: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoicesShape {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidatesShape {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlatShape {
    answer: Option<String>,
    response: Option<String>,
    message: Option<String>,
    output: Option<String>,
    text: Option<String>,
    data: Option<Box<FlatShape>>,
}

impl FlatShape {
    fn take_text(self) -> Option<String> {
        self.answer
            .or(self.response)
            .or(self.message)
            .or(self.output)
            .or(self.text)
            .or_else(|| self.data.and_then(|d| d.take_text()))
    }
}

/// Normalize a provider response body into the completion text.
fn extract_completion(raw: &str) -> Result<String> {
    // Shape 1: { status: "success", response: "..." } and variants.
    if let Ok(shape) = serde_json::from_str::<StatusShape>(raw) {
        if shape.status == "success" {
            if let Some(text) = shape
                .response
                .or(shape.message)
                .or(shape.output)
                .or(shape.text)
            {
                return Ok(text);
            }
        }
    }

    // Shape 2: OpenAI-style { choices: [{ message: { content } }] }.
    if let Ok(shape) = serde_json::from_str::<ChoicesShape>(raw) {
        if let Some(choice) = shape.choices.into_iter().next() {
            if let Some(content) = choice.message.and_then(|m| m.content) {
                return Ok(content);
            }
            if let Some(text) = choice.text {
                return Ok(text);
            }
        }
    }

    // Shape 3: Gemini-style { candidates: [{ content: { parts } }] }.
    if let Ok(shape) = serde_json::from_str::<CandidatesShape>(raw) {
        if let Some(text) = shape
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
        {
            return Ok(text);
        }
    }

    // Shape 4: flat or data-nested answer/response/message/output/text.
    if let Ok(shape) = serde_json::from_str::<FlatShape>(raw) {
        if let Some(text) = shape.take_text() {
            return Ok(text);
        }
    }

    Err(KnowledgeError::ResponseShape(format!(
        "no known completion shape matched: {}",
        snippet(raw)
    )))
}

fn snippet(raw: &str) -> String {
    const SNIPPET_CHARS: usize = 300;
    raw.chars().take(SNIPPET_CHARS).collect()
}
