#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, info};

use crate::chunking::{ChunkingConfig, chunk_text};
use crate::embeddings::EmbeddingProvider;
use crate::vectordb::{ChunkRecord, Namespace, NamespaceRouter, VectorStore};
use crate::Result;

/// A retrieved knowledge chunk, ranked by relevance
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeHit {
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    /// `1 - cosine distance`: higher is more relevant
    pub relevance_score: f32,
    pub namespace: Namespace,
    pub id: String,
}

/// Façade over chunking, embedding and namespace storage.
///
/// Dependencies are injected at construction; there is no hidden global
/// instance.
pub struct KnowledgeStore {
    embeddings: Box<dyn EmbeddingProvider>,
    store: VectorStore,
    chunking: ChunkingConfig,
}

impl KnowledgeStore {
    #[inline]
    pub fn new(
        embeddings: Box<dyn EmbeddingProvider>,
        store: VectorStore,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            embeddings,
            store,
            chunking,
        }
    }

    /// Chunk, embed and store a document in a namespace.
    ///
    /// Per-chunk metadata carries `title`, `chunk_index`, `total_chunks`
    /// and `source`; caller-supplied keys win on collision. Returns the
    /// generated chunk ids in chunk order.
    #[inline]
    pub async fn store_document(
        &self,
        content: &str,
        title: &str,
        namespace: Namespace,
        metadata: Option<&BTreeMap<String, String>>,
        source: Option<&str>,
    ) -> Result<Vec<String>> {
        let chunks = chunk_text(content, self.chunking.target_tokens, self.chunking.overlap_tokens);
        if chunks.is_empty() {
            debug!("Document '{}' produced no chunks, nothing stored", title);
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.embed(&texts)?;

        let total_chunks = chunks.len();
        let created_at = Utc::now().to_rfc3339();

        let mut ids = Vec::with_capacity(total_chunks);
        let mut records = Vec::with_capacity(total_chunks);
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            let id = chunk_id(title, chunk.chunk_index, &chunk.text);

            let mut chunk_metadata = BTreeMap::from([
                ("title".to_string(), title.to_string()),
                ("chunk_index".to_string(), chunk.chunk_index.to_string()),
                ("total_chunks".to_string(), total_chunks.to_string()),
                (
                    "source".to_string(),
                    source.unwrap_or("unknown").to_string(),
                ),
            ]);
            if let Some(extra) = metadata {
                // Caller-supplied keys take precedence.
                for (key, value) in extra {
                    chunk_metadata.insert(key.clone(), value.clone());
                }
            }

            let doc_type = chunk_metadata.get("doc_type").cloned();
            records.push(ChunkRecord {
                id: id.clone(),
                vector,
                content: chunk.text,
                title: title.to_string(),
                source: source.unwrap_or("unknown").to_string(),
                doc_type,
                chunk_index: chunk.chunk_index as u32,
                total_chunks: total_chunks as u32,
                metadata: chunk_metadata,
                created_at: created_at.clone(),
            });
            ids.push(id);
        }

        self.store.insert(namespace, &records).await?;

        info!(
            "Stored document '{}' as {} chunks in namespace {}",
            title, total_chunks, namespace
        );
        Ok(ids)
    }

    /// Retrieve the most relevant knowledge chunks for a query.
    ///
    /// Searches one namespace, or all of them when `namespace` is
    /// `None`. Results are ordered by descending relevance score.
    #[inline]
    pub async fn retrieve_knowledge(
        &self,
        query: &str,
        namespace: Option<Namespace>,
        top_k: usize,
    ) -> Result<Vec<KnowledgeHit>> {
        let query_vector = self.embeddings.embed_single(query)?;

        let router = NamespaceRouter::new(&self.store);
        let results = router.search(&query_vector, namespace, top_k, None).await?;

        let mut hits: Vec<KnowledgeHit> = results
            .into_iter()
            .map(|r| KnowledgeHit {
                content: r.content,
                metadata: r.metadata,
                relevance_score: 1.0 - r.distance,
                namespace: r.namespace,
                id: r.id,
            })
            .collect();

        // The router orders by ascending distance; sort explicitly by
        // relevance rather than relying on the two orders coinciding.
        hits.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

        Ok(hits)
    }

    /// Store a market research/insight document
    #[inline]
    pub async fn store_market_insight(
        &self,
        content: &str,
        title: &str,
        date: Option<&str>,
        source: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut metadata =
            BTreeMap::from([("doc_type".to_string(), "market_insight".to_string())]);
        if let Some(date) = date {
            metadata.insert("date".to_string(), date.to_string());
        }
        self.store_document(content, title, Namespace::MarketInsights, Some(&metadata), source)
            .await
    }

    /// Store an investment strategy document
    #[inline]
    pub async fn store_strategy(
        &self,
        content: &str,
        title: &str,
        strategy_type: Option<&str>,
        risk_level: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut metadata = BTreeMap::from([("doc_type".to_string(), "strategy".to_string())]);
        if let Some(strategy_type) = strategy_type {
            metadata.insert("strategy_type".to_string(), strategy_type.to_string());
        }
        if let Some(risk_level) = risk_level {
            metadata.insert("risk_level".to_string(), risk_level.to_string());
        }
        self.store_document(content, title, Namespace::Strategies, Some(&metadata), None)
            .await
    }

    /// Store risk-profile-based guidance
    #[inline]
    pub async fn store_risk_guidance(
        &self,
        content: &str,
        title: &str,
        risk_profile: &str,
    ) -> Result<Vec<String>> {
        let metadata = BTreeMap::from([
            ("doc_type".to_string(), "risk_guidance".to_string()),
            ("risk_profile".to_string(), risk_profile.to_string()),
        ]);
        self.store_document(content, title, Namespace::RiskProfiles, Some(&metadata), None)
            .await
    }

    /// Chunk count per namespace
    #[inline]
    pub async fn namespace_counts(&self) -> Result<Vec<(Namespace, usize)>> {
        let mut counts = Vec::with_capacity(Namespace::ALL.len());
        for namespace in Namespace::ALL {
            counts.push((namespace, self.store.count(namespace).await?));
        }
        Ok(counts)
    }

    /// Remove every chunk in a namespace
    #[inline]
    pub async fn wipe_namespace(&self, namespace: Namespace) -> Result<()> {
        self.store.delete_namespace(namespace).await
    }
}

/// Deterministic chunk id: title, chunk index and a short content hash,
/// so re-ingesting the same document overwrites rather than duplicates.
fn chunk_id(title: &str, chunk_index: usize, text: &str) -> String {
    format!("{title}_{chunk_index}_{}", fnv1a(text) % 10000)
}

fn fnv1a(text: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for byte in text.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
