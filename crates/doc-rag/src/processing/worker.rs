//! Change-triggered vectorization worker

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::config::VectorizationConfig;
use crate::error::{Error, Result};
use crate::providers::{DocumentStore, EmbeddingProvider, RecordFilter};
use crate::retry::retry_with_backoff;
use crate::storage::ChangeEvent;
use crate::types::DocumentRecord;

/// Counts for one processed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Records embedded and written back
    pub vectorized: usize,
    /// Records already current, deleted, or gone from the store
    pub skipped: usize,
}

/// Computes embeddings for records flagged `vector_update_flag = true`
///
/// The worker writes through the store it is given; pass the unobserved
/// store so its own writes do not come back through the change feed.
pub struct VectorizationWorker {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: VectorizationConfig,
    ready: Option<watch::Sender<bool>>,
}

impl VectorizationWorker {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: VectorizationConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            ready: None,
        }
    }

    /// Report `true` on `ready` once the startup sweep has finished
    pub fn with_ready_signal(mut self, ready: watch::Sender<bool>) -> Self {
        self.ready = Some(ready);
        self
    }

    /// Consume the change feed until every sender is gone
    pub async fn run(self, mut receiver: mpsc::Receiver<ChangeEvent>) {
        tracing::info!(
            "Vectorization worker started (batch size {}, {} redeliveries, embedder {})",
            self.config.max_batch_size,
            self.config.max_redeliveries,
            self.embedder.name()
        );

        if self.config.sweep_on_start {
            match self.sweep().await {
                Ok(report) => tracing::info!(
                    "Startup sweep: {} vectorized, {} skipped",
                    report.vectorized,
                    report.skipped
                ),
                Err(e) => tracing::error!("Startup sweep failed: {}", e),
            }
        }
        if let Some(ready) = &self.ready {
            ready.send_replace(true);
        }

        let batch_size = self.config.max_batch_size.max(1);
        while let Some(first) = receiver.recv().await {
            let mut events = vec![first];
            while events.len() < batch_size {
                match receiver.try_recv() {
                    Ok(event) => events.push(event),
                    Err(_) => break,
                }
            }

            let records = changed_records(events);
            if records.is_empty() {
                continue;
            }
            if let Err(e) = self.deliver(&records).await {
                tracing::error!(
                    "Dropping batch of {} records after {} redeliveries: {}; they stay flagged for the next sweep",
                    records.len(),
                    self.config.max_redeliveries,
                    e
                );
            }
        }

        tracing::info!("Change feed closed, vectorization worker stopping");
    }

    /// Process one batch, redelivering it with backoff while it fails
    pub async fn deliver(&self, records: &[DocumentRecord]) -> Result<BatchReport> {
        retry_with_backoff(
            "vectorization batch",
            self.config.max_redeliveries,
            Duration::from_millis(self.config.redelivery_backoff_ms),
            || self.process_batch(records),
        )
        .await
    }

    /// Vectorize every record still pending in the store
    pub async fn sweep(&self) -> Result<BatchReport> {
        let pending = self
            .store
            .query_by_field(&RecordFilter::PendingVectorization)
            .await?;
        tracing::info!("Sweeping {} records pending vectorization", pending.len());

        let mut total = BatchReport::default();
        for chunk in pending.chunks(self.config.max_batch_size.max(1)) {
            let report = self.deliver(chunk).await?;
            total.vectorized += report.vectorized;
            total.skipped += report.skipped;
        }
        Ok(total)
    }

    /// Embed every stale record in `records`
    ///
    /// All records are attempted even when some fail; any failure fails the
    /// whole batch so it is delivered again. Failed records keep their flag.
    pub async fn process_batch(&self, records: &[DocumentRecord]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut failures: Vec<(String, Error)> = Vec::new();

        for record in records {
            if !record.vector_update_flag {
                report.skipped += 1;
                continue;
            }
            match self.vectorize(&record.id).await {
                Ok(true) => report.vectorized += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::error!("Vectorization failed for record {} ({}): {}", record.id, record.file_path, e);
                    failures.push((record.id.clone(), e));
                }
            }
        }

        if let Some((_, first)) = failures.first() {
            return Err(Error::VectorizationFailed {
                failed: failures.len(),
                total: records.len(),
                first_error: first.to_string(),
            });
        }

        tracing::debug!(
            "Batch done: {} vectorized, {} skipped",
            report.vectorized,
            report.skipped
        );
        Ok(report)
    }

    /// Embed the current version of one record; `Ok(false)` when nothing was due
    ///
    /// The record is re-read before embedding, and the result is written with
    /// `replace_record`, so a record purged while its embedding was computed
    /// stays purged.
    async fn vectorize(&self, id: &str) -> Result<bool> {
        let Some(mut current) = self.store.get_record(id).await? else {
            tracing::debug!("Record {} no longer exists, skipping", id);
            return Ok(false);
        };
        if !current.vector_update_flag || current.delete_flag {
            return Ok(false);
        }

        let vector = self.embedder.embed(&current.content).await?;
        current.mark_vectorized(vector);
        if !self.store.replace_record(&current).await? {
            tracing::debug!("Record {} was purged during embedding, discarding vector", id);
            return Ok(false);
        }

        tracing::debug!(
            "Vectorized {} page {} ({} dims)",
            current.file_name,
            current.page_number,
            current.vector.len()
        );
        Ok(true)
    }
}

fn changed_records(events: Vec<ChangeEvent>) -> Vec<DocumentRecord> {
    events
        .into_iter()
        .filter_map(|event| match event {
            ChangeEvent::Upserted(record) => Some(record),
            ChangeEvent::Deleted { id } => {
                tracing::trace!("Ignoring deletion of {}", id);
                None
            }
        })
        .collect()
}
