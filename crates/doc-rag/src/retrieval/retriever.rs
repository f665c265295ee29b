//! Query-time retrieval: embed the question, fetch the closest records

use std::sync::Arc;

use crate::error::Result;
use crate::providers::{DocumentStore, EmbeddingProvider};
use crate::types::ScoredRecord;

use super::search::enforce_ranking_contract;

/// Embeds queries and runs similarity search against the document store
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DocumentStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn DocumentStore>) -> Self {
        Self { embedder, store }
    }

    /// Compute the query embedding
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embedder.embed(query).await.map_err(|e| {
            tracing::error!("Query embedding failed via {}: {}", self.embedder.name(), e);
            e
        })
    }

    /// Records scoring strictly above `threshold`, best first, at most `top_k`
    pub async fn search(
        &self,
        embedding: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        tracing::info!("Vector search (threshold: {}, top_k: {})", threshold, top_k);

        let results = self
            .store
            .query_by_similarity(embedding, threshold, top_k)
            .await
            .map_err(|e| {
                tracing::error!("Similarity query failed on {}: {}", self.store.name(), e);
                e
            })?;

        let results = enforce_ranking_contract(results, threshold, top_k);
        for (i, r) in results.iter().enumerate() {
            tracing::debug!(
                "  [{}] {} (page {}) score {:.4}",
                i + 1,
                r.record.file_name,
                r.record.page_number,
                r.score
            );
        }
        Ok(results)
    }
}
