//! Document record schema: the unit of indexing

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Text formats the ingestion pipeline can index
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Plain text file
    Text,
    /// Markdown file
    Markdown,
}

impl ContentKind {
    /// Detect the content kind from a file extension (without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "text" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Text => "Text File",
            Self::Markdown => "Markdown",
        }
    }
}

/// A page of a source document, stored with its embedding
///
/// `file_path` is the dedup key: every record of one object-storage location
/// shares it, and `page_number` tells the records apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordFields")]
pub struct DocumentRecord {
    /// Unique record ID
    pub id: String,
    /// Object name inside the ingestion container
    pub file_name: String,
    /// Full object-storage URL of the source
    pub file_path: String,
    /// Zero-based page index within the source
    pub page_number: u32,
    /// Normalized text, starting with a title line
    pub content: String,
    /// Path-derived keywords
    pub keywords: Vec<String>,
    /// Embedding; empty until the vectorization worker runs
    pub vector: Vec<f32>,
    /// Soft-delete marker
    pub delete_flag: bool,
    /// True while `vector` is missing or stale
    pub vector_update_flag: bool,
}

impl DocumentRecord {
    /// Create a freshly written record awaiting its embedding
    pub fn pending(
        file_name: impl Into<String>,
        file_path: impl Into<String>,
        page_number: u32,
        content: impl Into<String>,
        keywords: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            file_path: file_path.into(),
            page_number,
            content: content.into(),
            keywords,
            vector: Vec::new(),
            delete_flag: false,
            vector_update_flag: true,
        }
    }

    /// Build a record from a loosely typed JSON document, validating the schema
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let fields: RecordFields = serde_json::from_value(value)
            .map_err(|e| Error::InvalidRecord(e.to_string()))?;
        Self::try_from(fields)
    }

    /// Store the computed embedding and clear the staleness flag in one step
    pub fn mark_vectorized(&mut self, vector: Vec<f32>) {
        self.vector = vector;
        self.vector_update_flag = false;
    }

    /// Whether the record may appear in similarity search
    pub fn is_searchable(&self) -> bool {
        !self.vector.is_empty() && !self.delete_flag
    }
}

/// Raw record fields as they arrive at a boundary (store row, change feed, HTTP)
///
/// Required: `file_name`, `file_path`, `page_number`, `content`, `vector_update_flag`.
/// Optional: `id` (generated when absent), `keywords`, `vector`, `delete_flag`.
#[derive(Debug, Default, Deserialize)]
pub struct RecordFields {
    pub id: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub page_number: Option<i64>,
    pub content: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub vector: Option<Vec<f32>>,
    pub delete_flag: Option<bool>,
    pub vector_update_flag: Option<bool>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::InvalidRecord(format!("missing required field '{}'", field)))
}

impl TryFrom<RecordFields> for DocumentRecord {
    type Error = Error;

    fn try_from(fields: RecordFields) -> Result<Self> {
        let file_name = required(fields.file_name, "file_name")?;
        let file_path = required(fields.file_path, "file_path")?;
        let page_number = required(fields.page_number, "page_number")?;
        let content = required(fields.content, "content")?;
        let vector_update_flag = required(fields.vector_update_flag, "vector_update_flag")?;

        if file_path.trim().is_empty() {
            return Err(Error::InvalidRecord("file_path must not be empty".to_string()));
        }
        let page_number = u32::try_from(page_number).map_err(|_| {
            Error::InvalidRecord(format!(
                "page_number must be a non-negative integer, got {}",
                page_number
            ))
        })?;

        let id = match fields.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };

        Ok(Self {
            id,
            file_name,
            file_path,
            page_number,
            content,
            keywords: fields.keywords.unwrap_or_default(),
            vector: fields.vector.unwrap_or_default(),
            delete_flag: fields.delete_flag.unwrap_or(false),
            vector_update_flag,
        })
    }
}

/// A record returned by similarity search with its score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    /// The matched record
    pub record: DocumentRecord,
    /// Cosine similarity to the query (higher is closer)
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_record_awaits_vector() {
        let record = DocumentRecord::pending("notes.md", "https://x/rag-docs/notes.md", 0, "# notes.md\n\nHello", vec![]);
        assert!(record.vector.is_empty());
        assert!(record.vector_update_flag);
        assert!(!record.delete_flag);
        assert!(!record.is_searchable());
        assert!(Uuid::parse_str(&record.id).is_ok());
    }

    #[test]
    fn test_mark_vectorized_clears_flag() {
        let mut record = DocumentRecord::pending("a.txt", "p", 0, "x", vec![]);
        record.mark_vectorized(vec![0.1, 0.2]);
        assert!(!record.vector_update_flag);
        assert!(record.is_searchable());
    }

    #[test]
    fn test_from_value_generates_missing_id() {
        let record = DocumentRecord::from_value(json!({
            "file_name": "a.txt",
            "file_path": "https://acct/rag-docs/a.txt",
            "page_number": 0,
            "content": "# a.txt\n\nbody",
            "vector_update_flag": true
        }))
        .unwrap();

        assert!(!record.id.is_empty());
        assert!(record.keywords.is_empty());
        assert!(record.vector.is_empty());
    }

    #[test]
    fn test_from_value_rejects_missing_field() {
        let err = DocumentRecord::from_value(json!({
            "id": "1",
            "file_name": "a.txt",
            "page_number": 0,
            "content": "x",
            "vector_update_flag": true
        }))
        .unwrap_err();

        assert!(err.to_string().contains("file_path"));
    }

    #[test]
    fn test_from_value_rejects_negative_page() {
        let err = DocumentRecord::from_value(json!({
            "file_name": "a.txt",
            "file_path": "p",
            "page_number": -1,
            "content": "x",
            "vector_update_flag": false
        }))
        .unwrap_err();

        assert!(matches!(err, Error::InvalidRecord(_)));
    }

    #[test]
    fn test_deserialize_goes_through_validation() {
        let parsed: std::result::Result<DocumentRecord, _> =
            serde_json::from_value(json!({ "id": "1", "content": "x" }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_content_kind_from_extension() {
        assert_eq!(ContentKind::from_extension("MD"), Some(ContentKind::Markdown));
        assert_eq!(ContentKind::from_extension("txt"), Some(ContentKind::Text));
        assert_eq!(ContentKind::from_extension("pdf"), None);
    }
}
