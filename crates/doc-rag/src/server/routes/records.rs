//! Record lookup for operators

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::providers::RecordFilter;
use crate::server::state::AppState;
use crate::types::DocumentRecord;

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    pub file_path: Option<String>,
    pub file_name: Option<String>,
}

/// GET /api/records?file_path=...|file_name=...
pub async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<Vec<DocumentRecord>>> {
    let filter = match (query.file_path, query.file_name) {
        (Some(path), _) => RecordFilter::FilePath(path),
        (None, Some(name)) => RecordFilter::FileName(name),
        (None, None) => {
            return Err(Error::InvalidRequest(
                "one of file_path or file_name is required".to_string(),
            ))
        }
    };
    Ok(Json(state.store().query_by_field(&filter).await?))
}
