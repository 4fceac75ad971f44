// Vector database module
// Namespace-partitioned LanceDB storage and cross-namespace search


pub mod router;
pub mod store;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{KnowledgeError, Result};

pub use router::NamespaceRouter;
pub use store::VectorStore;

/// A named partition of the knowledge corpus. Every stored chunk belongs
/// to exactly one namespace; searches target one namespace or the union
/// of all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    General,
    MarketInsights,
    Strategies,
    RiskProfiles,
}

impl Namespace {
    /// All namespaces, in the fixed enumeration order used for fan-out
    /// search and tie-breaking.
    pub const ALL: [Namespace; 4] = [
        Namespace::General,
        Namespace::MarketInsights,
        Namespace::Strategies,
        Namespace::RiskProfiles,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::General => "general",
            Namespace::MarketInsights => "market_insights",
            Namespace::Strategies => "strategies",
            Namespace::RiskProfiles => "risk_profiles",
        }
    }

    /// Name of the backing LanceDB table
    #[inline]
    pub fn table_name(self) -> &'static str {
        match self {
            Namespace::General => "knowledge_general",
            Namespace::MarketInsights => "knowledge_market_insights",
            Namespace::Strategies => "knowledge_strategies",
            Namespace::RiskProfiles => "knowledge_risk_profiles",
        }
    }
}

impl fmt::Display for Namespace {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = KnowledgeError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "general" => Ok(Namespace::General),
            "market_insights" => Ok(Namespace::MarketInsights),
            "strategies" => Ok(Namespace::Strategies),
            "risk_profiles" => Ok(Namespace::RiskProfiles),
            other => Err(KnowledgeError::Config(format!(
                "invalid namespace: {other}. Valid: general, market_insights, strategies, \
                 risk_profiles"
            ))),
        }
    }
}

/// A chunk with its embedding, ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Unique within the whole store, not just the namespace
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub title: String,
    pub source: String,
    /// Document category (market_insight, strategy, risk_guidance, ...)
    pub doc_type: Option<String>,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Full metadata mapping, stored alongside the filterable columns
    pub metadata: BTreeMap<String, String>,
    /// RFC3339 creation timestamp
    pub created_at: String,
}

/// A single nearest-neighbor match
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub namespace: Namespace,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    /// Cosine distance: lower is more similar
    pub distance: f32,
    /// `1 - distance`: higher is more similar
    pub similarity: f32,
}

/// Columns an equality metadata filter may reference
pub const FILTERABLE_COLUMNS: [&str; 3] = ["title", "source", "doc_type"];

/// Equality filter over the filterable metadata columns, applied before
/// ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, String>,
}

impl MetadataFilter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.conditions.insert(column.to_string(), value.to_string());
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Render the filter as a LanceDB SQL predicate. Unknown columns are
    /// a configuration error naming the filterable set.
    #[inline]
    pub fn to_predicate(&self) -> Result<String> {
        let mut clauses = Vec::with_capacity(self.conditions.len());
        for (column, value) in &self.conditions {
            if !FILTERABLE_COLUMNS.contains(&column.as_str()) {
                return Err(KnowledgeError::Config(format!(
                    "unsupported filter column: {column}. Valid: {}",
                    FILTERABLE_COLUMNS.join(", ")
                )));
            }
            clauses.push(format!("{column} = '{}'", escape_sql_literal(value)));
        }
        Ok(clauses.join(" AND "))
    }
}

fn escape_sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}
