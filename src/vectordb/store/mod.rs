
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use tracing::{debug, info, warn};

use super::{ChunkRecord, MetadataFilter, Namespace, SearchResult};
use crate::{KnowledgeError, Result};

/// Namespace-partitioned vector store backed by LanceDB.
///
/// Each namespace owns one table, created lazily on first insert. The
/// vector dimension is taken from the first inserted batch; inserting
/// vectors of a different dimension recreates the affected table.
pub struct VectorStore {
    connection: Connection,
}

impl VectorStore {
    /// Open (or create) the store at the given directory.
    #[inline]
    pub async fn open(db_path: &Path) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                KnowledgeError::Database(format!(
                    "failed to create vector database directory: {e}"
                ))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri).execute().await.map_err(|e| {
            KnowledgeError::Database(format!("failed to connect to LanceDB: {e}"))
        })?;

        info!("Vector store initialized at {:?}", db_path);
        Ok(Self { connection })
    }

    /// Insert chunk records into a namespace.
    ///
    /// All vectors in the batch must share one dimension. Records whose
    /// id already exists in the namespace overwrite the stored entry.
    #[inline]
    pub async fn insert(&self, namespace: Namespace, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No records to insert into {}", namespace);
            return Ok(());
        }

        let vector_dim = records[0].vector.len();
        if vector_dim == 0 {
            return Err(KnowledgeError::Database(
                "cannot insert zero-length embedding vectors".to_string(),
            ));
        }
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(KnowledgeError::Database(format!(
                "inconsistent vector dimensions in batch: {} vs {} (id {})",
                vector_dim,
                bad.vector.len(),
                bad.id
            )));
        }

        debug!(
            "Storing batch of {} records in namespace {}",
            records.len(),
            namespace
        );

        let table = self.ensure_table(namespace, vector_dim).await?;

        // Overwrite semantics for duplicate ids: drop any stored rows
        // with the same id before appending.
        let id_list = records
            .iter()
            .map(|r| format!("'{}'", r.id.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(", ");
        table
            .delete(&format!("id IN ({id_list})"))
            .await
            .map_err(|e| {
                KnowledgeError::Database(format!("failed to clear duplicate ids: {e}"))
            })?;

        let record_batch = create_record_batch(records, vector_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table.add(reader).execute().await.map_err(|e| {
            KnowledgeError::Database(format!("failed to insert records: {e}"))
        })?;

        info!("Stored {} records in namespace {}", records.len(), namespace);
        Ok(())
    }

    /// Nearest-neighbor query within one namespace, by cosine distance.
    ///
    /// Returns at most `k` results, nearest first. An optional equality
    /// metadata filter restricts the candidate set before ranking. A
    /// namespace with no stored chunks yields an empty result.
    #[inline]
    pub async fn query(
        &self,
        namespace: Namespace,
        query_vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        if !self.table_exists(namespace).await? {
            debug!("Namespace {} has no table yet, returning empty", namespace);
            return Ok(Vec::new());
        }

        let table = self.open_table(namespace).await?;

        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| {
                KnowledgeError::Database(format!("failed to create vector search: {e}"))
            })?
            .distance_type(DistanceType::Cosine)
            .column("vector")
            .limit(k);

        if let Some(filter) = filter {
            if !filter.is_empty() {
                query = query.only_if(filter.to_predicate()?);
            }
        }

        let mut stream = query.execute().await.map_err(|e| {
            KnowledgeError::Database(format!("failed to execute search: {e}"))
        })?;

        let mut results = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| {
            KnowledgeError::Database(format!("failed to read result stream: {e}"))
        })? {
            results.extend(parse_search_batch(&batch, namespace)?);
        }

        debug!(
            "Query in namespace {} returned {} results",
            namespace,
            results.len()
        );
        Ok(results)
    }

    /// Remove every chunk in a namespace. Idempotent; the namespace
    /// accepts new inserts afterwards.
    #[inline]
    pub async fn delete_namespace(&self, namespace: Namespace) -> Result<()> {
        if !self.table_exists(namespace).await? {
            debug!("Namespace {} already empty, nothing to delete", namespace);
            return Ok(());
        }

        self.connection
            .drop_table(namespace.table_name())
            .await
            .map_err(|e| {
                KnowledgeError::Database(format!("failed to drop namespace table: {e}"))
            })?;

        info!("Deleted all chunks in namespace {}", namespace);
        Ok(())
    }

    /// Number of chunks stored in a namespace
    #[inline]
    pub async fn count(&self, namespace: Namespace) -> Result<usize> {
        if !self.table_exists(namespace).await? {
            return Ok(0);
        }

        let table = self.open_table(namespace).await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| KnowledgeError::Database(format!("failed to count rows: {e}")))
    }

    async fn table_exists(&self, namespace: Namespace) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| KnowledgeError::Database(format!("failed to list tables: {e}")))?;
        Ok(names.iter().any(|n| n == namespace.table_name()))
    }

    async fn open_table(&self, namespace: Namespace) -> Result<Table> {
        self.connection
            .open_table(namespace.table_name())
            .execute()
            .await
            .map_err(|e| KnowledgeError::Database(format!("failed to open table: {e}")))
    }

    /// Open the namespace table, creating it (or recreating it on a
    /// vector-dimension change) as needed.
    async fn ensure_table(&self, namespace: Namespace, vector_dim: usize) -> Result<Table> {
        if self.table_exists(namespace).await? {
            let table = self.open_table(namespace).await?;
            let schema = table.schema().await.map_err(|e| {
                KnowledgeError::Database(format!("failed to read table schema: {e}"))
            })?;

            match schema_vector_dimension(&schema) {
                Some(existing) if existing == vector_dim => return Ok(table),
                existing => {
                    warn!(
                        "Vector dimension changed from {:?} to {} in namespace {}, recreating table",
                        existing, vector_dim, namespace
                    );
                    self.connection
                        .drop_table(namespace.table_name())
                        .await
                        .map_err(|e| {
                            KnowledgeError::Database(format!(
                                "failed to drop table for recreation: {e}"
                            ))
                        })?;
                }
            }
        }

        let schema = create_schema(vector_dim);
        self.connection
            .create_empty_table(namespace.table_name(), schema)
            .execute()
            .await
            .map_err(|e| KnowledgeError::Database(format!("failed to create table: {e}")))?;

        info!(
            "Created table {} with {} dimensions",
            namespace.table_name(),
            vector_dim
        );
        self.open_table(namespace).await
    }
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("content", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("doc_type", DataType::Utf8, true),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("total_chunks", DataType::UInt32, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn schema_vector_dimension(schema: &Schema) -> Option<usize> {
    schema.fields().iter().find_map(|field| {
        if field.name() == "vector" {
            if let DataType::FixedSizeList(_, size) = field.data_type() {
                return usize::try_from(*size).ok();
            }
        }
        None
    })
}

fn create_record_batch(records: &[ChunkRecord], vector_dim: usize) -> Result<RecordBatch> {
    let len = records.len();

    let mut ids = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut titles = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);
    let mut doc_types = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut total_chunks = Vec::with_capacity(len);
    let mut metadata_blobs = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);

    for record in records {
        ids.push(record.id.as_str());
        contents.push(record.content.as_str());
        titles.push(record.title.as_str());
        sources.push(record.source.as_str());
        doc_types.push(record.doc_type.as_deref());
        chunk_indices.push(record.chunk_index);
        total_chunks.push(record.total_chunks);
        metadata_blobs.push(serde_json::to_string(&record.metadata).map_err(|e| {
            KnowledgeError::Database(format!("failed to serialize chunk metadata: {e}"))
        })?);
        created_ats.push(record.created_at.as_str());
        flat_values.extend_from_slice(&record.vector);
    }

    let values_array = Float32Array::from(flat_values);
    let item_field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(item_field, vector_dim as i32, Arc::new(values_array), None)
            .map_err(|e| KnowledgeError::Database(format!("failed to create vector array: {e}")))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(contents)),
        Arc::new(StringArray::from(titles)),
        Arc::new(StringArray::from(sources)),
        Arc::new(StringArray::from(doc_types)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(UInt32Array::from(total_chunks)),
        Arc::new(StringArray::from(metadata_blobs)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(create_schema(vector_dim), arrays)
        .map_err(|e| KnowledgeError::Database(format!("failed to create record batch: {e}")))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| KnowledgeError::Database(format!("missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| KnowledgeError::Database(format!("invalid {name} column type")))
}

fn parse_search_batch(batch: &RecordBatch, namespace: Namespace) -> Result<Vec<SearchResult>> {
    let ids = string_column(batch, "id")?;
    let contents = string_column(batch, "content")?;
    let metadata_blobs = string_column(batch, "metadata")?;

    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut results = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let metadata: BTreeMap<String, String> = serde_json::from_str(metadata_blobs.value(row))
            .map_err(|e| {
                KnowledgeError::Database(format!("failed to parse stored metadata: {e}"))
            })?;

        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        results.push(SearchResult {
            id: ids.value(row).to_string(),
            namespace,
            content: contents.value(row).to_string(),
            metadata,
            distance,
            similarity: 1.0 - distance,
        });
    }

    Ok(results)
}
