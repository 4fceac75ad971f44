
use tracing::{debug, warn};

use super::{MetadataFilter, Namespace, SearchResult, VectorStore};
use crate::Result;

/// Fans a query out across namespaces and merges the results into one
/// globally distance-ranked list.
pub struct NamespaceRouter<'a> {
    store: &'a VectorStore,
}

impl<'a> NamespaceRouter<'a> {
    #[inline]
    pub fn new(store: &'a VectorStore) -> Self {
        Self { store }
    }

    /// Search one namespace, or all of them when `namespace` is `None`.
    ///
    /// Fan-out queries cap each namespace at `top_k`, merge the
    /// candidate pools, stable-sort by ascending distance (ties keep
    /// namespace enumeration order) and truncate to the global `top_k`.
    ///
    /// A namespace that fails during fan-out contributes nothing instead
    /// of aborting the whole search; a targeted single-namespace query
    /// still propagates its error.
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        namespace: Option<Namespace>,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        if let Some(namespace) = namespace {
            return self.store.query(namespace, query_vector, top_k, filter).await;
        }

        let mut merged = Vec::new();
        for candidate in Namespace::ALL {
            match self.store.query(candidate, query_vector, top_k, filter).await {
                Ok(results) => merged.extend(results),
                Err(error) => {
                    warn!(
                        "Namespace {} failed during fan-out search, skipping: {}",
                        candidate, error
                    );
                }
            }
        }

        merged.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        merged.truncate(top_k);

        debug!("Fan-out search returned {} merged results", merged.len());
        Ok(merged)
    }
}
