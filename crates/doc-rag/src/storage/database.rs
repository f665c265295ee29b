//! SQLite-backed document store
//!
//! Records live in a single table; vectors and keywords are stored as JSON text.
//! Every row is validated on the way out, so a corrupted row surfaces as
//! `InvalidRecord` instead of a half-filled record.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::{DocumentStore, RecordFilter};
use crate::retrieval::rank_by_similarity;
use crate::types::{DocumentRecord, RecordFields, ScoredRecord};

const SELECT_COLUMNS: &str = "id, file_name, file_path, page_number, content, keywords, vector, \
                              delete_flag, vector_update_flag";

/// Synchronous record table access
pub struct RecordDb {
    conn: Mutex<Connection>,
}

/// Row as stored, before schema validation
struct RawRow {
    id: String,
    file_name: Option<String>,
    file_path: Option<String>,
    page_number: Option<i64>,
    content: Option<String>,
    keywords: Option<String>,
    vector: Option<String>,
    delete_flag: Option<bool>,
    vector_update_flag: Option<bool>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file_name: row.get(1)?,
            file_path: row.get(2)?,
            page_number: row.get(3)?,
            content: row.get(4)?,
            keywords: row.get(5)?,
            vector: row.get(6)?,
            delete_flag: row.get(7)?,
            vector_update_flag: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<DocumentRecord> {
        let keywords = decode_json(self.keywords.as_deref(), &self.id, "keywords")?;
        let vector = decode_json(self.vector.as_deref(), &self.id, "vector")?;

        DocumentRecord::try_from(RecordFields {
            id: Some(self.id),
            file_name: self.file_name,
            file_path: self.file_path,
            page_number: self.page_number,
            content: self.content,
            keywords,
            vector,
            delete_flag: self.delete_flag,
            vector_update_flag: self.vector_update_flag,
        })
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(
    text: Option<&str>,
    id: &str,
    column: &str,
) -> Result<Option<T>> {
    text.map(|t| {
        serde_json::from_str(t).map_err(|e| {
            Error::InvalidRecord(format!("record {} has malformed {}: {}", id, column, e))
        })
    })
    .transpose()
}

impl RecordDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::store("open", format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::store("open", format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::store("migrate", format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                file_name TEXT,
                file_path TEXT,
                page_number INTEGER,
                content TEXT,
                keywords TEXT,
                vector TEXT,
                delete_flag INTEGER,
                vector_update_flag INTEGER,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_file_path ON records(file_path);
            CREATE INDEX IF NOT EXISTS idx_records_file_name ON records(file_name);
            CREATE INDEX IF NOT EXISTS idx_records_pending ON records(vector_update_flag);
        "#,
        )
        .map_err(|e| Error::store("migrate", format!("Failed to create tables: {}", e)))?;

        Ok(())
    }

    /// Insert or replace a record by id
    pub fn upsert(&self, record: &DocumentRecord) -> Result<()> {
        let keywords = serde_json::to_string(&record.keywords)?;
        let vector = serde_json::to_string(&record.vector)?;
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO records (id, file_name, file_path, page_number, content, keywords,
                                 vector, delete_flag, vector_update_flag, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                file_name = excluded.file_name,
                file_path = excluded.file_path,
                page_number = excluded.page_number,
                content = excluded.content,
                keywords = excluded.keywords,
                vector = excluded.vector,
                delete_flag = excluded.delete_flag,
                vector_update_flag = excluded.vector_update_flag,
                updated_at = excluded.updated_at
            "#,
            params![
                record.id,
                record.file_name,
                record.file_path,
                record.page_number,
                record.content,
                keywords,
                vector,
                record.delete_flag,
                record.vector_update_flag,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Overwrite an existing row; returns whether one was there to overwrite
    pub fn replace(&self, record: &DocumentRecord) -> Result<bool> {
        let keywords = serde_json::to_string(&record.keywords)?;
        let vector = serde_json::to_string(&record.vector)?;
        let conn = self.conn.lock();
        let updated = conn.execute(
            r#"
            UPDATE records SET
                file_name = ?2,
                file_path = ?3,
                page_number = ?4,
                content = ?5,
                keywords = ?6,
                vector = ?7,
                delete_flag = ?8,
                vector_update_flag = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
            params![
                record.id,
                record.file_name,
                record.file_path,
                record.page_number,
                record.content,
                keywords,
                vector,
                record.delete_flag,
                record.vector_update_flag,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(updated > 0)
    }

    /// Delete a record; returns whether a row was removed
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM records WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    pub fn get(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM records WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }

    /// Records matching a field filter, ordered by path then page
    pub fn query(&self, filter: &RecordFilter) -> Result<Vec<DocumentRecord>> {
        let (clause, value, deleted) = match filter {
            RecordFilter::FilePath(path) => ("file_path = ?1", Some(path.as_str()), 0),
            RecordFilter::FileName(name) => ("file_name = ?1", Some(name.as_str()), 0),
            RecordFilter::PendingVectorization => ("vector_update_flag = 1", None, 0),
            RecordFilter::DeletedFilePath(path) => ("file_path = ?1", Some(path.as_str()), 1),
        };
        let sql = format!(
            "SELECT {} FROM records WHERE {} AND delete_flag = {} \
             ORDER BY file_path, page_number",
            SELECT_COLUMNS, clause, deleted
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = match value {
            Some(v) => stmt
                .query_map(params![v], RawRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map([], RawRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        drop(stmt);
        drop(conn);

        rows.into_iter().map(RawRow::into_record).collect()
    }

    /// Live records that carry a vector
    pub fn searchable(&self) -> Result<Vec<DocumentRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM records WHERE delete_flag = 0 AND vector IS NOT NULL AND vector != '[]'",
            SELECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], RawRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        let mut records = Vec::with_capacity(rows.len());
        for raw in rows {
            match raw.into_record() {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping unreadable record during search: {}", e),
            }
        }
        Ok(records)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Document store over [`RecordDb`], running queries on the blocking pool
pub struct SqliteDocumentStore {
    db: Arc<RecordDb>,
}

impl SqliteDocumentStore {
    pub fn new(db: RecordDb) -> Self {
        Self { db: Arc::new(db) }
    }

    /// Open the database file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        tracing::info!("Opening SQLite document store at {}", path.as_ref().display());
        Ok(Self::new(RecordDb::new(path)?))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&RecordDb) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn upsert_record(&self, record: &DocumentRecord) -> Result<()> {
        let record = record.clone();
        self.blocking(move |db| db.upsert(&record)).await
    }

    async fn replace_record(&self, record: &DocumentRecord) -> Result<bool> {
        let record = record.clone();
        self.blocking(move |db| db.replace(&record)).await
    }

    async fn delete_record(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.blocking(move |db| db.delete(&id)).await
    }

    async fn get_record(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let id = id.to_string();
        self.blocking(move |db| db.get(&id)).await
    }

    async fn query_by_field(&self, filter: &RecordFilter) -> Result<Vec<DocumentRecord>> {
        let filter = filter.clone();
        self.blocking(move |db| db.query(&filter)).await
    }

    async fn query_by_similarity(
        &self,
        vector: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let query = vector.to_vec();
        self.blocking(move |db| {
            let records = db.searchable()?;
            Ok(rank_by_similarity(&records, &query, threshold, top_k))
        })
        .await
    }

    async fn len(&self) -> Result<usize> {
        self.blocking(|db| db.count()).await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.blocking(|db| db.count()).await.is_ok())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteDocumentStore {
        SqliteDocumentStore::new(RecordDb::in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        let store = store();
        let mut record = DocumentRecord::pending(
            "docs/a.md",
            "https://acct/rag-docs/docs/a.md",
            0,
            "# docs/a.md\n\nbody",
            vec!["docs".to_string(), "a".to_string()],
        );
        store.upsert_record(&record).await.unwrap();

        record.mark_vectorized(vec![0.25, -0.5]);
        store.upsert_record(&record).await.unwrap();

        let stored = store.get_record(&record.id).await.unwrap().unwrap();
        assert_eq!(stored, record);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_by_field_and_pending() {
        let store = store();
        let mut done = DocumentRecord::pending("a.md", "path-a", 1, "x", vec![]);
        done.mark_vectorized(vec![1.0]);
        store.upsert_record(&done).await.unwrap();
        store
            .upsert_record(&DocumentRecord::pending("a.md", "path-a", 0, "y", vec![]))
            .await
            .unwrap();

        let by_path = store
            .query_by_field(&RecordFilter::FilePath("path-a".to_string()))
            .await
            .unwrap();
        assert_eq!(by_path.iter().map(|r| r.page_number).collect::<Vec<_>>(), vec![0, 1]);

        let pending = store
            .query_by_field(&RecordFilter::PendingVectorization)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].page_number, 0);
    }

    #[tokio::test]
    async fn test_similarity_skips_soft_deleted_and_unvectorized() {
        let store = store();
        let mut live = DocumentRecord::pending("live.md", "p1", 0, "x", vec![]);
        live.mark_vectorized(vec![1.0, 0.0]);
        let mut gone = DocumentRecord::pending("gone.md", "p2", 0, "x", vec![]);
        gone.mark_vectorized(vec![1.0, 0.0]);
        gone.delete_flag = true;
        let pending = DocumentRecord::pending("pending.md", "p3", 0, "x", vec![]);

        for r in [&live, &gone, &pending] {
            store.upsert_record(r).await.unwrap();
        }

        let results = store.query_by_similarity(&[1.0, 0.0], 0.5, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.file_name, "live.md");
    }

    #[tokio::test]
    async fn test_malformed_row_is_invalid_record() {
        let db = RecordDb::in_memory().unwrap();
        db.conn
            .lock()
            .execute(
                "INSERT INTO records (id, file_name, file_path, page_number, content, \
                 vector_update_flag, updated_at) VALUES ('bad', 'f', 'p', -1, 'c', 1, 'now')",
                [],
            )
            .unwrap();

        let err = db.get("bad").unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn test_replace_skips_missing_row() {
        let store = store();
        let mut record = DocumentRecord::pending("a.md", "p", 0, "x", vec![]);
        assert!(!store.replace_record(&record).await.unwrap());
        assert!(store.is_empty().await.unwrap());

        store.upsert_record(&record).await.unwrap();
        record.mark_vectorized(vec![0.5]);
        assert!(store.replace_record(&record).await.unwrap());
        assert_eq!(store.get_record(&record.id).await.unwrap().unwrap(), record);
    }

    #[tokio::test]
    async fn test_deleted_file_path_query() {
        let store = store();
        let live = DocumentRecord::pending("a.md", "p", 0, "x", vec![]);
        let mut gone = DocumentRecord::pending("a.md", "p", 0, "old", vec![]);
        gone.delete_flag = true;
        store.upsert_record(&live).await.unwrap();
        store.upsert_record(&gone).await.unwrap();

        let tombstones = store
            .query_by_field(&RecordFilter::DeletedFilePath("p".to_string()))
            .await
            .unwrap();
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].id, gone.id);
    }

    #[tokio::test]
    async fn test_delete_record() {
        let store = store();
        let record = DocumentRecord::pending("a.md", "p", 0, "x", vec![]);
        store.upsert_record(&record).await.unwrap();
        assert!(store.delete_record(&record.id).await.unwrap());
        assert!(!store.delete_record(&record.id).await.unwrap());
        assert!(store.is_empty().await.unwrap());
    }
}
