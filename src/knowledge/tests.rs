use super::*;
use crate::chunking::ChunkingConfig;
use tempfile::TempDir;

const DIMS: usize = 32;

/// Deterministic bag-of-words embedder so similarity behaves sensibly
/// without a model server.
struct HashEmbedder;

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }
}

fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMS];
    for word in text.split_whitespace() {
        let word: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if word.is_empty() {
            continue;
        }
        let mut hash = 0usize;
        for byte in word.bytes() {
            hash = hash.wrapping_mul(31).wrapping_add(byte as usize);
        }
        vector[hash % DIMS] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

async fn create_test_store() -> (KnowledgeStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::open(&temp_dir.path().join("vectors"))
        .await
        .expect("should open vector store");
    (
        KnowledgeStore::new(Box::new(HashEmbedder), store, ChunkingConfig::default()),
        temp_dir,
    )
}

#[tokio::test]
async fn store_and_retrieve_document() {
    let (store, _temp_dir) = create_test_store().await;

    store
        .store_document(
            "Paragraph A.\n\nParagraph B.",
            "t",
            Namespace::General,
            None,
            None,
        )
        .await
        .expect("store should succeed");
    store
        .store_document(
            "Completely unrelated text about cooking pasta.",
            "noise",
            Namespace::General,
            None,
            None,
        )
        .await
        .expect("store should succeed");

    let hits = store
        .retrieve_knowledge("Paragraph A", Some(Namespace::General), 1)
        .await
        .expect("retrieve should succeed");

    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("Paragraph A"));
    assert_eq!(hits[0].namespace, Namespace::General);
    assert_eq!(hits[0].metadata.get("title").map(String::as_str), Some("t"));

    // The planted unrelated document scores lower for this query.
    let all_hits = store
        .retrieve_knowledge("Paragraph A", Some(Namespace::General), 5)
        .await
        .expect("retrieve should succeed");
    assert!(all_hits.len() >= 2);
    assert!(all_hits[0].relevance_score > all_hits[1].relevance_score);
    assert!(all_hits[0].content.contains("Paragraph A"));
}

#[tokio::test]
async fn chunk_ids_are_deterministic_and_ordered() {
    let (store, _temp_dir) = create_test_store().await;
    let content = "First paragraph here.\n\nSecond paragraph here.";

    let first = store
        .store_document(content, "doc", Namespace::General, None, None)
        .await
        .expect("store should succeed");
    let second = store
        .store_document(content, "doc", Namespace::General, None, None)
        .await
        .expect("store should succeed");

    assert!(!first.is_empty());
    assert_eq!(first, second, "same content should produce the same ids");
    assert!(first[0].starts_with("doc_0_"));

    // Re-ingestion overwrote rather than duplicated.
    let counts = store.namespace_counts().await.expect("counts");
    let general = counts
        .iter()
        .find(|(ns, _)| *ns == Namespace::General)
        .expect("general count");
    assert_eq!(general.1, first.len());
}

#[tokio::test]
async fn empty_document_stores_nothing() {
    let (store, _temp_dir) = create_test_store().await;

    let ids = store
        .store_document("   \n\n  ", "empty", Namespace::General, None, None)
        .await
        .expect("store should succeed");
    assert!(ids.is_empty());
}

#[tokio::test]
async fn caller_metadata_wins_on_collision() {
    let (store, _temp_dir) = create_test_store().await;

    let metadata = BTreeMap::from([
        ("source".to_string(), "caller-source".to_string()),
        ("custom".to_string(), "value".to_string()),
    ]);
    store
        .store_document(
            "Some knowledge content.",
            "doc",
            Namespace::General,
            Some(&metadata),
            Some("ingest-source"),
        )
        .await
        .expect("store should succeed");

    let hits = store
        .retrieve_knowledge("knowledge content", Some(Namespace::General), 1)
        .await
        .expect("retrieve should succeed");

    assert_eq!(
        hits[0].metadata.get("source").map(String::as_str),
        Some("caller-source")
    );
    assert_eq!(
        hits[0].metadata.get("custom").map(String::as_str),
        Some("value")
    );
    assert_eq!(
        hits[0].metadata.get("total_chunks").map(String::as_str),
        Some("1")
    );
}

#[tokio::test]
async fn namespace_isolation_through_facade() {
    let (store, _temp_dir) = create_test_store().await;

    store
        .store_document(
            "Dividend growth strategy notes.",
            "strat",
            Namespace::Strategies,
            None,
            None,
        )
        .await
        .expect("store should succeed");

    let hits = store
        .retrieve_knowledge("dividend growth", Some(Namespace::General), 5)
        .await
        .expect("retrieve should succeed");
    assert!(hits.is_empty());
}

#[tokio::test]
async fn retrieval_across_all_namespaces() {
    let (store, _temp_dir) = create_test_store().await;

    store
        .store_market_insight("Treasury yields rose sharply.", "yields", None, None)
        .await
        .expect("store should succeed");
    store
        .store_strategy(
            "Barbell bond ladder strategy.",
            "barbell",
            Some("fixed_income"),
            Some("moderate"),
        )
        .await
        .expect("store should succeed");

    let hits = store
        .retrieve_knowledge("treasury yields", None, 5)
        .await
        .expect("retrieve should succeed");

    assert!(!hits.is_empty());
    assert_eq!(hits[0].namespace, Namespace::MarketInsights);
    for pair in hits.windows(2) {
        assert!(pair[0].relevance_score >= pair[1].relevance_score);
    }
}

#[tokio::test]
async fn convenience_wrappers_set_doc_type() {
    let (store, _temp_dir) = create_test_store().await;

    store
        .store_risk_guidance(
            "Conservative investors should hold more bonds.",
            "guidance",
            "conservative",
        )
        .await
        .expect("store should succeed");

    let hits = store
        .retrieve_knowledge("conservative bonds", Some(Namespace::RiskProfiles), 1)
        .await
        .expect("retrieve should succeed");

    assert_eq!(
        hits[0].metadata.get("doc_type").map(String::as_str),
        Some("risk_guidance")
    );
    assert_eq!(
        hits[0].metadata.get("risk_profile").map(String::as_str),
        Some("conservative")
    );
}

#[tokio::test]
async fn wipe_namespace_then_store_again() {
    let (store, _temp_dir) = create_test_store().await;

    store
        .store_document("Old knowledge.", "old", Namespace::General, None, None)
        .await
        .expect("store should succeed");
    store
        .wipe_namespace(Namespace::General)
        .await
        .expect("wipe should succeed");

    let hits = store
        .retrieve_knowledge("old knowledge", Some(Namespace::General), 5)
        .await
        .expect("retrieve should succeed");
    assert!(hits.is_empty());

    store
        .store_document("Fresh knowledge.", "fresh", Namespace::General, None, None)
        .await
        .expect("store after wipe should succeed");
    let hits = store
        .retrieve_knowledge("fresh knowledge", Some(Namespace::General), 5)
        .await
        .expect("retrieve should succeed");
    assert_eq!(hits.len(), 1);
}
