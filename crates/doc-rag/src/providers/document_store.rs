//! Document store trait: records keyed by id, queried by field or by vector

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DocumentRecord, ScoredRecord};

/// Typed field query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    /// All records of one source object
    FilePath(String),
    /// All records with the given object name
    FileName(String),
    /// Records whose embedding is missing or stale
    PendingVectorization,
    /// Soft-deleted records of one source object
    DeletedFilePath(String),
}

impl RecordFilter {
    /// Whether a record matches
    ///
    /// Soft-deleted records only match `DeletedFilePath`, and it matches nothing else.
    pub fn matches(&self, record: &DocumentRecord) -> bool {
        match self {
            RecordFilter::DeletedFilePath(path) => {
                record.delete_flag && record.file_path == *path
            }
            _ if record.delete_flag => false,
            RecordFilter::FilePath(path) => record.file_path == *path,
            RecordFilter::FileName(name) => record.file_name == *name,
            RecordFilter::PendingVectorization => record.vector_update_flag,
        }
    }
}

/// Trait for the document collection backing ingestion and retrieval
///
/// Implementations:
/// - `MemoryDocumentStore`: in-process concurrent map
/// - `SqliteDocumentStore`: durable SQLite table
/// - `ObservedStore`: decorator publishing changes to the vectorization worker
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace a record by id
    async fn upsert_record(&self, record: &DocumentRecord) -> Result<()>;

    /// Overwrite an existing record; returns `false` without writing when the id is gone
    async fn replace_record(&self, record: &DocumentRecord) -> Result<bool>;

    /// Delete a record by id; returns whether it existed
    async fn delete_record(&self, id: &str) -> Result<bool>;

    /// Fetch a record by id
    async fn get_record(&self, id: &str) -> Result<Option<DocumentRecord>>;

    /// Records matching a field filter, across all partitions
    async fn query_by_field(&self, filter: &RecordFilter) -> Result<Vec<DocumentRecord>>;

    /// Up to `top_k` records scoring strictly above `threshold`, best first
    ///
    /// Records without a vector, or soft-deleted, are never returned.
    async fn query_by_similarity(
        &self,
        vector: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>>;

    /// Total number of records (including soft-deleted)
    async fn len(&self) -> Result<usize>;

    /// Check if the store is empty
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Check if the store is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Get store name for logging
    fn name(&self) -> &str;
}
