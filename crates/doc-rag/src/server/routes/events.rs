//! Object-storage notification endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::ingestion::{BackfillReport, IngestOutcome};
use crate::server::state::AppState;
use crate::types::StorageEvent;

#[derive(Serialize)]
pub struct EventsResponse {
    pub results: Vec<IngestOutcome>,
}

/// POST /api/events/storage - handle one notification or an array of them
///
/// Notifications are processed in order. The first failure aborts the request
/// with an error status so the sender redelivers; earlier notifications in the
/// batch are idempotent and safe to replay.
pub async fn storage_events(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<EventsResponse>> {
    let events = StorageEvent::parse_batch(&body)?;
    tracing::info!("Received {} storage notification(s)", events.len());

    let mut results = Vec::with_capacity(events.len());
    for event in &events {
        results.push(state.ingestion().handle_event(event).await?);
    }
    Ok(Json(EventsResponse { results }))
}

/// POST /api/events/backfill - index everything currently in the container
pub async fn backfill(State(state): State<AppState>) -> Result<Json<BackfillReport>> {
    Ok(Json(state.ingestion().backfill().await?))
}
