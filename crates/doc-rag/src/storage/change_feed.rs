//! Change feed over the document store
//!
//! [`ObservedStore`] forwards every successful write to a channel the
//! vectorization worker consumes. A full channel applies backpressure to the
//! writer; a closed channel never fails the write, and records whose event was
//! lost are picked up by the worker's pending sweep on the next start.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::providers::{DocumentStore, RecordFilter};
use crate::types::{DocumentRecord, ScoredRecord};

/// Default feed capacity
pub const DEFAULT_FEED_CAPACITY: usize = 1000;

/// A write observed on the document store
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// Record inserted or replaced, as written
    Upserted(DocumentRecord),
    /// Record removed
    Deleted { id: String },
}

/// Sending half of the change feed
#[derive(Clone)]
pub struct ChangeFeed {
    sender: mpsc::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Create a feed and the receiver the worker reads from
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    async fn publish(&self, event: ChangeEvent) {
        if let Err(mpsc::error::SendError(event)) = self.sender.send(event).await {
            tracing::warn!("Change feed closed, {} not delivered", describe(&event));
        }
    }
}

fn describe(event: &ChangeEvent) -> String {
    match event {
        ChangeEvent::Upserted(r) => format!("upsert {}", r.id),
        ChangeEvent::Deleted { id } => format!("delete {}", id),
    }
}

/// Document store decorator that publishes writes to a [`ChangeFeed`]
pub struct ObservedStore {
    inner: Arc<dyn DocumentStore>,
    feed: ChangeFeed,
}

impl ObservedStore {
    pub fn new(inner: Arc<dyn DocumentStore>, feed: ChangeFeed) -> Self {
        Self { inner, feed }
    }

    /// The wrapped store; writes through it are not published
    pub fn inner(&self) -> Arc<dyn DocumentStore> {
        self.inner.clone()
    }
}

#[async_trait]
impl DocumentStore for ObservedStore {
    async fn upsert_record(&self, record: &DocumentRecord) -> Result<()> {
        self.inner.upsert_record(record).await?;
        self.feed.publish(ChangeEvent::Upserted(record.clone())).await;
        Ok(())
    }

    async fn replace_record(&self, record: &DocumentRecord) -> Result<bool> {
        let replaced = self.inner.replace_record(record).await?;
        if replaced {
            self.feed.publish(ChangeEvent::Upserted(record.clone())).await;
        }
        Ok(replaced)
    }

    async fn delete_record(&self, id: &str) -> Result<bool> {
        let removed = self.inner.delete_record(id).await?;
        if removed {
            self.feed
                .publish(ChangeEvent::Deleted { id: id.to_string() })
                .await;
        }
        Ok(removed)
    }

    async fn get_record(&self, id: &str) -> Result<Option<DocumentRecord>> {
        self.inner.get_record(id).await
    }

    async fn query_by_field(&self, filter: &RecordFilter) -> Result<Vec<DocumentRecord>> {
        self.inner.query_by_field(filter).await
    }

    async fn query_by_similarity(
        &self,
        vector: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        self.inner.query_by_similarity(vector, threshold, top_k).await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }

    async fn health_check(&self) -> Result<bool> {
        self.inner.health_check().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
