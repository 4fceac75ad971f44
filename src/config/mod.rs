// Configuration management module
// TOML-backed settings for embeddings, chunking, the vector store and
// the completion client.

pub mod settings;

pub use settings::{
    Config, ConfigError, EmbeddingBackend, EmbeddingsConfig, LlmConfig, LlmProviderKind,
    OllamaConfig, OpenAiConfig, PayloadStyle,
};
