//! Object-storage notification handling: index, replace and remove records

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{DeletionMode, IngestionConfig};
use crate::error::{Error, Result};
use crate::providers::{DocumentStore, ObjectStorage, RecordFilter};
use crate::types::{ContentKind, DocumentRecord, StorageEvent, StorageEventKind};

use super::keywords::extract_keywords;
use super::splitter::{splitter_from_config, PageSplitter};

/// What handling one notification did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Source (re)indexed: old records purged, new pending records written
    Indexed {
        file_path: String,
        records: usize,
        purged: usize,
    },
    /// Source deleted; its records were purged
    Removed { file_path: String, purged: usize },
    /// Source cannot be indexed (unsupported extension or not text); records
    /// of an earlier version were still purged
    Skipped {
        file_name: String,
        reason: String,
        purged: usize,
    },
    /// Notification type this pipeline does not handle
    Ignored { event_type: String },
}

/// Totals for a full container backfill
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Reacts to object-storage notifications and keeps the document store in step
pub struct IngestionPipeline {
    store: Arc<dyn DocumentStore>,
    storage: Arc<dyn ObjectStorage>,
    splitter: Box<dyn PageSplitter>,
    config: IngestionConfig,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn ObjectStorage>,
        config: IngestionConfig,
    ) -> Self {
        let splitter = splitter_from_config(&config.page_split);
        Self {
            store,
            storage,
            splitter,
            config,
        }
    }

    /// Handle one notification
    ///
    /// Store and storage failures are logged and returned unchanged; redelivery
    /// is left to whoever delivered the notification.
    pub async fn handle_event(&self, event: &StorageEvent) -> Result<IngestOutcome> {
        match &event.kind {
            StorageEventKind::Created => {
                let logical_path = self.logical_path(&event.url)?;
                self.index_object(logical_path).await
            }
            StorageEventKind::Deleted => {
                let logical_path = self.logical_path(&event.url)?;
                self.remove_object(logical_path).await
            }
            StorageEventKind::Other(event_type) => {
                tracing::info!("Ignoring storage event '{}' for {}", event_type, event.url);
                Ok(IngestOutcome::Ignored {
                    event_type: event_type.clone(),
                })
            }
        }
    }

    /// Index every object currently in the container
    pub async fn backfill(&self) -> Result<BackfillReport> {
        let names = self.storage.list_objects(&self.config.container).await?;
        tracing::info!(
            "Backfilling {} objects from container '{}'",
            names.len(),
            self.config.container
        );

        let mut report = BackfillReport::default();
        for name in names {
            match self.index_object(&name).await {
                Ok(IngestOutcome::Skipped { .. }) => report.skipped += 1,
                Ok(_) => report.indexed += 1,
                Err(e) => {
                    tracing::error!("Backfill failed for {}: {}", name, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Backfill complete: {} indexed, {} skipped, {} failed",
            report.indexed,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Path of the object inside the container, taken from its URL
    fn logical_path<'a>(&self, url: &'a str) -> Result<&'a str> {
        let marker = format!("{}/", self.config.container);
        let (_, rest) = url.split_once(&marker).ok_or_else(|| {
            Error::InvalidEvent(format!(
                "url '{}' is not in container '{}'",
                url, self.config.container
            ))
        })?;
        let path = rest.split(['?', '#']).next().unwrap_or_default();
        if path.is_empty() {
            return Err(Error::InvalidEvent(format!("url '{}' names no object", url)));
        }
        Ok(path)
    }

    async fn index_object(&self, logical_path: &str) -> Result<IngestOutcome> {
        let container = &self.config.container;
        let file_path = self.storage.object_url(container, logical_path);

        let text = match self.read_text(logical_path).await {
            Ok(text) => text,
            Err(Error::UnsupportedContent { file_name, reason }) => {
                let purged = self.purge(&file_path).await?;
                tracing::warn!(
                    "Skipping {}: {} ({} stale records purged)",
                    file_name,
                    reason,
                    purged
                );
                return Ok(IngestOutcome::Skipped {
                    file_name,
                    reason,
                    purged,
                });
            }
            Err(e) => return Err(e),
        };

        let keywords = extract_keywords(&file_path, container);
        let title = format!("# {}\n\n", logical_path);
        let records: Vec<DocumentRecord> = self
            .splitter
            .split(&text)
            .into_iter()
            .enumerate()
            .map(|(page, body)| {
                DocumentRecord::pending(
                    logical_path,
                    file_path.as_str(),
                    page as u32,
                    format!("{}{}", title, body),
                    keywords.clone(),
                )
            })
            .collect();

        let purged = self.purge(&file_path).await?;
        for record in &records {
            self.store.upsert_record(record).await.map_err(|e| {
                tracing::error!(
                    "Failed to upsert record {} (page {}) for {}: {}",
                    record.id,
                    record.page_number,
                    file_path,
                    e
                );
                e
            })?;
        }

        tracing::info!(
            "Indexed {} as {} page(s) via {} splitter ({} stale records purged)",
            file_path,
            records.len(),
            self.splitter.name(),
            purged
        );
        Ok(IngestOutcome::Indexed {
            file_path,
            records: records.len(),
            purged,
        })
    }

    async fn remove_object(&self, logical_path: &str) -> Result<IngestOutcome> {
        let file_path = self.storage.object_url(&self.config.container, logical_path);
        let purged = self.purge(&file_path).await?;
        if purged == 0 {
            tracing::debug!("Delete for {} matched no records", file_path);
        } else {
            tracing::info!("Removed {} records for {}", purged, file_path);
        }
        Ok(IngestOutcome::Removed { file_path, purged })
    }

    /// Remove every live record of `file_path` according to the deletion mode
    ///
    /// In soft mode the tombstones left by the previous purge are deleted
    /// first, so each source keeps at most one generation of them.
    async fn purge(&self, file_path: &str) -> Result<usize> {
        if self.config.deletion_mode == DeletionMode::Soft {
            self.drop_tombstones(file_path).await?;
        }

        let existing = self
            .store
            .query_by_field(&RecordFilter::FilePath(file_path.to_string()))
            .await
            .map_err(|e| {
                tracing::error!("Failed to query records for {}: {}", file_path, e);
                e
            })?;

        for mut record in existing.iter().cloned() {
            let result = match self.config.deletion_mode {
                DeletionMode::Hard => self.store.delete_record(&record.id).await.map(|_| ()),
                DeletionMode::Soft => {
                    record.delete_flag = true;
                    self.store.upsert_record(&record).await
                }
            };
            result.map_err(|e| {
                tracing::error!("Failed to purge record {} of {}: {}", record.id, file_path, e);
                e
            })?;
        }
        Ok(existing.len())
    }

    async fn drop_tombstones(&self, file_path: &str) -> Result<()> {
        let tombstones = self
            .store
            .query_by_field(&RecordFilter::DeletedFilePath(file_path.to_string()))
            .await?;
        for record in &tombstones {
            self.store.delete_record(&record.id).await.map_err(|e| {
                tracing::error!("Failed to drop tombstone {} of {}: {}", record.id, file_path, e);
                e
            })?;
        }
        if !tombstones.is_empty() {
            tracing::debug!("Dropped {} tombstones of {}", tombstones.len(), file_path);
        }
        Ok(())
    }

    /// Read and decode an object, or explain why it cannot be indexed
    async fn read_text(&self, logical_path: &str) -> Result<String> {
        let kind = self.supported_kind(logical_path)?;
        let object = self
            .storage
            .read_object(&self.config.container, logical_path)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to read {} from {}: {}",
                    logical_path,
                    self.storage.name(),
                    e
                );
                e
            })?;

        tracing::debug!(
            "Read {} ({}, {} bytes)",
            object.name,
            kind.display_name(),
            object.bytes.len()
        );
        String::from_utf8(object.bytes)
            .map_err(|_| Error::unsupported(logical_path, "content is not valid UTF-8 text"))
    }

    fn supported_kind(&self, logical_path: &str) -> Result<ContentKind> {
        let extension = Path::new(logical_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let enabled = self
            .config
            .supported_extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&extension));

        match ContentKind::from_extension(&extension) {
            Some(kind) if enabled => Ok(kind),
            _ => Err(Error::unsupported(
                logical_path,
                format!("extension '{}' is not supported", extension),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{LocalObjectStorage, MemoryDocumentStore};
    use crate::testing::FailingStore;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        store: Arc<MemoryDocumentStore>,
        storage: Arc<LocalObjectStorage>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let storage = Arc::new(LocalObjectStorage::new(dir.path().to_path_buf()).unwrap());
            Self {
                dir,
                store: Arc::new(MemoryDocumentStore::new()),
                storage,
            }
        }

        fn pipeline(&self, config: IngestionConfig) -> IngestionPipeline {
            IngestionPipeline::new(self.store.clone(), self.storage.clone(), config)
        }

        fn put(&self, path: &str, content: &[u8]) -> StorageEvent {
            let full = self.dir.path().join("rag-docs").join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
            StorageEvent::created(self.storage.object_url("rag-docs", path))
        }

        fn url(&self, path: &str) -> String {
            self.storage.object_url("rag-docs", path)
        }

        async fn records_for(&self, path: &str) -> Vec<DocumentRecord> {
            self.store
                .query_by_field(&RecordFilter::FilePath(self.url(path)))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_markdown_is_indexed_with_title() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(IngestionConfig::default());

        let event = fx.put("notes.md", b"Hello");
        let outcome = pipeline.handle_event(&event).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Indexed { records: 1, purged: 0, .. }));

        let records = fx.records_for("notes.md").await;
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.content, "# notes.md\n\nHello");
        assert_eq!(record.file_name, "notes.md");
        assert_eq!(record.page_number, 0);
        assert!(record.vector_update_flag);
        assert!(record.vector.is_empty());
        assert_eq!(record.keywords, vec!["notes"]);
    }

    #[tokio::test]
    async fn test_reupload_replaces_previous_records() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(IngestionConfig::default());

        pipeline.handle_event(&fx.put("notes.md", b"Hello")).await.unwrap();
        let outcome = pipeline.handle_event(&fx.put("notes.md", b"World")).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Indexed { purged: 1, .. }));

        let records = fx.records_for("notes.md").await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "# notes.md\n\nWorld");
        assert_eq!(fx.store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_notification_is_idempotent() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(IngestionConfig::default());

        let event = fx.put("guide/intro.txt", b"Welcome");
        pipeline.handle_event(&event).await.unwrap();
        pipeline.handle_event(&event).await.unwrap();

        let records = fx.records_for("guide/intro.txt").await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].keywords, vec!["guide", "intro"]);
        assert_eq!(records[0].file_name, "guide/intro.txt");
    }

    #[tokio::test]
    async fn test_delete_removes_all_pages() {
        let fx = Fixture::new();
        let config = IngestionConfig {
            page_split: crate::config::PageSplitConfig::Paragraphs { max_chars: 5 },
            ..Default::default()
        };
        let pipeline = fx.pipeline(config);

        pipeline.handle_event(&fx.put("long.md", b"one\n\ntwo\n\nthree")).await.unwrap();
        assert_eq!(fx.records_for("long.md").await.len(), 3);

        let outcome = pipeline
            .handle_event(&StorageEvent::deleted(fx.url("long.md")))
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Removed { purged: 3, .. }));
        assert!(fx.records_for("long.md").await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_of_unknown_path_is_noop() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(IngestionConfig::default());
        let outcome = pipeline
            .handle_event(&StorageEvent::deleted(fx.url("never.md")))
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Removed { purged: 0, .. }));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_records() {
        let fx = Fixture::new();
        let config = IngestionConfig {
            deletion_mode: DeletionMode::Soft,
            ..Default::default()
        };
        let pipeline = fx.pipeline(config);

        pipeline.handle_event(&fx.put("a.md", b"x")).await.unwrap();
        pipeline
            .handle_event(&StorageEvent::deleted(fx.url("a.md")))
            .await
            .unwrap();

        assert!(fx.records_for("a.md").await.is_empty());
        assert_eq!(fx.store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_one_generation_of_tombstones() {
        let fx = Fixture::new();
        let config = IngestionConfig {
            deletion_mode: DeletionMode::Soft,
            ..Default::default()
        };
        let pipeline = fx.pipeline(config);

        for body in [b"one", b"two", b"six"] {
            pipeline.handle_event(&fx.put("a.md", body)).await.unwrap();
        }

        let live = fx.records_for("a.md").await;
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].content, "# a.md\n\nsix");
        let tombstones = fx
            .store
            .query_by_field(&RecordFilter::DeletedFilePath(fx.url("a.md")))
            .await
            .unwrap();
        assert_eq!(tombstones.len(), 1);
        assert_eq!(fx.store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_skipped() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(IngestionConfig::default());

        let outcome = pipeline.handle_event(&fx.put("scan.pdf", b"%PDF")).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Skipped { ref file_name, .. } if file_name == "scan.pdf"));
        assert!(fx.store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_skipped() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(IngestionConfig::default());

        let outcome = pipeline.handle_event(&fx.put("bin.txt", &[0xff, 0xfe, 0x00])).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Skipped { purged: 0, .. }));
    }

    #[tokio::test]
    async fn test_overwrite_with_undecodable_content_purges_old_records() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(IngestionConfig::default());

        pipeline.handle_event(&fx.put("notes.txt", b"Hello")).await.unwrap();
        assert_eq!(fx.records_for("notes.txt").await.len(), 1);

        let outcome = pipeline.handle_event(&fx.put("notes.txt", &[0xff, 0xfe])).await.unwrap();
        assert!(matches!(
            outcome,
            IngestOutcome::Skipped { ref file_name, purged: 1, .. } if file_name == "notes.txt"
        ));
        assert!(fx.records_for("notes.txt").await.is_empty());
        assert!(fx.store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_other_events_are_ignored() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(IngestionConfig::default());
        let event = StorageEvent {
            kind: StorageEventKind::Other("Microsoft.Storage.BlobTierChanged".to_string()),
            url: fx.url("a.md"),
        };
        let outcome = pipeline.handle_event(&event).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn test_url_outside_container_is_invalid() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(IngestionConfig::default());
        let err = pipeline
            .handle_event(&StorageEvent::created("https://acct/other/a.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEvent(_)));
    }

    #[tokio::test]
    async fn test_missing_object_propagates_storage_error() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(IngestionConfig::default());
        let err = pipeline
            .handle_event(&StorageEvent::created(fx.url("ghost.md")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let fx = Fixture::new();
        let pipeline = IngestionPipeline::new(
            Arc::new(FailingStore),
            fx.storage.clone(),
            IngestionConfig::default(),
        );
        let err = pipeline.handle_event(&fx.put("a.md", b"x")).await.unwrap_err();
        assert!(matches!(err, Error::Store { .. }));
    }

    #[tokio::test]
    async fn test_backfill_indexes_container() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(IngestionConfig::default());
        fx.put("a.md", b"a");
        fx.put("sub/b.txt", b"b");
        fx.put("c.png", b"c");

        let report = pipeline.backfill().await.unwrap();
        assert_eq!(
            report,
            BackfillReport {
                indexed: 2,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(fx.store.len().await.unwrap(), 2);
    }
}
