
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::chunking::ChunkingConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Which embedding backend to construct at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    #[default]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub backend: EmbeddingBackend,
    pub ollama: OllamaConfig,
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
        }
    }
}

impl OllamaConfig {
    /// Base URL of the Ollama server
    #[inline]
    pub fn server_url(&self) -> Result<Url, ConfigError> {
        let raw = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl(raw))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub model: String,
    /// Falls back to the OPENAI_API_KEY environment variable when unset
    pub api_key: Option<String>,
    /// Full endpoint override, mainly for tests
    pub endpoint: Option<String>,
    pub batch_size: u32,
}

impl Default for OpenAiConfig {
    #[inline]
    fn default() -> Self {
        Self {
            model: "text-embedding-3-large".to_string(),
            api_key: None,
            endpoint: None,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderKind {
    #[default]
    Free,
    Gemini,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayloadStyle {
    /// A single `message` field carrying system + prompt
    #[default]
    Message,
    /// A `messages` array of role/content pairs
    Messages,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub base_url: String,
    pub payload_style: PayloadStyle,
    pub gemini_model: String,
    /// Falls back to the GEMINI_API_KEY environment variable when unset
    pub gemini_api_key: Option<String>,
}

impl Default for LlmConfig {
    #[inline]
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Free,
            base_url: "https://apifreellm.com/api/chat".to_string(),
            payload_style: PayloadStyle::Message,
            gemini_model: "gemini-2.0-flash".to_string(),
            gemini_api_key: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid overlap: {0} tokens (must be at most 512)")]
    InvalidOverlap(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from the standard config directory, falling
    /// back to defaults when no file exists.
    #[inline]
    pub fn load() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to resolve config directory")?;
        Self::load_from(&config_dir)
    }

    #[inline]
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                embeddings: EmbeddingsConfig::default(),
                chunking: ChunkingConfig::default(),
                llm: LlmConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ollama = &self.embeddings.ollama;
        if ollama.protocol != "http" && ollama.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(ollama.protocol.clone()));
        }
        if ollama.port == 0 {
            return Err(ConfigError::InvalidPort(ollama.port));
        }
        if ollama.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(ollama.model.clone()));
        }
        if ollama.batch_size == 0 || ollama.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(ollama.batch_size));
        }

        let openai = &self.embeddings.openai;
        if openai.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(openai.model.clone()));
        }
        if openai.batch_size == 0 || openai.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(openai.batch_size));
        }

        if self.chunking.overlap_tokens > 512 {
            return Err(ConfigError::InvalidOverlap(self.chunking.overlap_tokens));
        }

        ollama.server_url()?;

        Ok(())
    }

    /// Directory holding config.toml and the on-disk vector store
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let base = dirs::config_dir().ok_or(ConfigError::DirectoryError)?;
        Ok(base.join("apex-knowledge"))
    }

    /// Location of the local vector database
    #[inline]
    pub fn vector_db_path(&self) -> PathBuf {
        self.base_dir.join("vectors")
    }
}
