//! In-process document store backed by a concurrent map

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::retrieval::rank_by_similarity;
use crate::types::{DocumentRecord, ScoredRecord};

use super::document_store::{DocumentStore, RecordFilter};

/// Document store holding records in memory
///
/// Suitable for development and tests; contents are lost on restart.
#[derive(Default)]
pub struct MemoryDocumentStore {
    records: DashMap<String, DocumentRecord>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert_record(&self, record: &DocumentRecord) -> Result<()> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn replace_record(&self, record: &DocumentRecord) -> Result<bool> {
        match self.records.get_mut(&record.id) {
            Some(mut existing) => {
                *existing = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_record(&self, id: &str) -> Result<bool> {
        Ok(self.records.remove(id).is_some())
    }

    async fn get_record(&self, id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn query_by_field(&self, filter: &RecordFilter) -> Result<Vec<DocumentRecord>> {
        let mut matches: Vec<DocumentRecord> = self
            .records
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        matches.sort_by(|a, b| {
            (a.file_path.as_str(), a.page_number).cmp(&(b.file_path.as_str(), b.page_number))
        });
        Ok(matches)
    }

    async fn query_by_similarity(
        &self,
        vector: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let snapshot: Vec<DocumentRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        Ok(rank_by_similarity(&snapshot, vector, threshold, top_k))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
