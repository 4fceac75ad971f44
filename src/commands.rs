use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{Config, EmbeddingBackend};
use crate::embeddings::{OllamaClient, provider_from_config};
use crate::knowledge::KnowledgeStore;
use crate::llm::LlmClient;
use crate::vectordb::{Namespace, VectorStore};

const ADVISOR_SYSTEM_PROMPT: &str = "You are a financial advisor assistant. Answer using the \
    provided knowledge passages when they are relevant, and say so when they are not.";

async fn open_knowledge_store(config: &Config) -> Result<KnowledgeStore> {
    let embeddings = provider_from_config(&config.embeddings)
        .context("Failed to construct embedding provider")?;
    let store = VectorStore::open(&config.vector_db_path())
        .await
        .context("Failed to open vector store")?;
    Ok(KnowledgeStore::new(
        embeddings,
        store,
        config.chunking.clone(),
    ))
}

/// Ingest a document file into a namespace
#[inline]
pub async fn ingest_document(
    file: &Path,
    title: Option<String>,
    namespace: Namespace,
    source: Option<String>,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read document: {}", file.display()))?;

    let title = title.unwrap_or_else(|| {
        file.file_stem()
            .map_or_else(|| "untitled".to_string(), |s| s.to_string_lossy().into_owned())
    });

    info!("Ingesting '{}' into namespace {}", title, namespace);

    let config = Config::load()?;
    let store = open_knowledge_store(&config).await?;

    let metadata: Option<BTreeMap<String, String>> = None;
    let ids = store
        .store_document(
            &content,
            &title,
            namespace,
            metadata.as_ref(),
            source.as_deref(),
        )
        .await
        .context("Failed to store document")?;

    println!("Stored '{}' as {} chunks in namespace {}", title, ids.len(), namespace);
    Ok(())
}

/// Search the knowledge store and print the matching chunks
#[inline]
pub async fn search_knowledge(
    query: &str,
    namespace: Option<Namespace>,
    top_k: usize,
) -> Result<()> {
    let config = Config::load()?;
    let store = open_knowledge_store(&config).await?;

    let hits = store
        .retrieve_knowledge(query, namespace, top_k)
        .await
        .context("Knowledge retrieval failed")?;

    if hits.is_empty() {
        println!("No matching knowledge found.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{}] {} (relevance {:.3})",
            i + 1,
            hit.namespace,
            hit.metadata.get("title").map_or("untitled", String::as_str),
            hit.relevance_score
        );
        println!("   {}", summarize(&hit.content));
    }
    Ok(())
}

/// Answer a question using retrieved knowledge as context
#[inline]
pub async fn ask(question: &str, namespace: Option<Namespace>, top_k: usize) -> Result<()> {
    let config = Config::load()?;
    let store = open_knowledge_store(&config).await?;

    let hits = store
        .retrieve_knowledge(question, namespace, top_k)
        .await
        .context("Knowledge retrieval failed")?;

    let mut prompt = String::new();
    if !hits.is_empty() {
        prompt.push_str("Relevant knowledge:\n");
        for hit in &hits {
            prompt.push_str("- ");
            prompt.push_str(&hit.content);
            prompt.push('\n');
        }
        prompt.push('\n');
    }
    prompt.push_str("Question: ");
    prompt.push_str(question);

    let client = LlmClient::new(&config.llm).context("Failed to construct completion client")?;
    let answer = tokio::task::spawn_blocking(move || {
        client.complete(&prompt, Some(ADVISOR_SYSTEM_PROMPT))
    })
    .await
    .context("Completion task failed")?
    .context("Completion request failed")?;

    println!("{answer}");
    Ok(())
}

/// Show per-namespace chunk counts and embedding backend health
#[inline]
pub async fn show_status() -> Result<()> {
    let config = Config::load()?;
    let store = open_knowledge_store(&config).await?;

    println!("Knowledge store at {}", config.vector_db_path().display());
    for (namespace, count) in store.namespace_counts().await? {
        println!("  {:<16} {} chunks", namespace.as_str(), count);
    }

    match config.embeddings.backend {
        EmbeddingBackend::Ollama => {
            let ollama = config.embeddings.ollama.clone();
            let health = tokio::task::spawn_blocking(move || {
                OllamaClient::new(&ollama).and_then(|client| client.health_check())
            })
            .await
            .context("Health check task failed")?;
            match health {
                Ok(()) => println!(
                    "Embedding backend: ollama ({}) healthy, model {}",
                    config.embeddings.ollama.host, config.embeddings.ollama.model
                ),
                Err(e) => println!("Embedding backend: ollama unreachable: {e}"),
            }
        }
        EmbeddingBackend::OpenAi => {
            println!(
                "Embedding backend: openai, model {}",
                config.embeddings.openai.model
            );
        }
    }
    Ok(())
}

/// Remove every chunk in a namespace
#[inline]
pub async fn wipe_namespace(namespace: Namespace) -> Result<()> {
    let config = Config::load()?;
    let store = open_knowledge_store(&config).await?;

    store
        .wipe_namespace(namespace)
        .await
        .with_context(|| format!("Failed to wipe namespace {namespace}"))?;

    println!("Wiped namespace {namespace}");
    Ok(())
}

/// Print the active configuration as TOML
#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load()?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("# {}", config.base_dir.join("config.toml").display());
    print!("{rendered}");
    Ok(())
}

fn summarize(content: &str) -> String {
    const MAX_CHARS: usize = 160;
    let flattened = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= MAX_CHARS {
        flattened
    } else {
        let truncated: String = flattened.chars().take(MAX_CHARS).collect();
        format!("{truncated}...")
    }
}
