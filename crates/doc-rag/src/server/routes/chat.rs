//! Chat endpoints: streamed answers, history, clear

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::chat::{TurnEvent, TurnPhase, TurnRequest};
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::ChatMessage;

const EVENT_BUFFER: usize = 64;

#[derive(Serialize)]
pub struct HistoryResponse {
    pub session: String,
    pub phase: TurnPhase,
    pub history: Vec<ChatMessage>,
}

fn to_sse(event: TurnEvent) -> std::result::Result<Event, axum::Error> {
    let name = match &event {
        TurnEvent::Delta { .. } => "delta",
        TurnEvent::References(_) => "references",
        TurnEvent::Failed { .. } => "error",
        TurnEvent::Completed => "done",
    };
    Event::default().event(name).json_data(&event)
}

/// POST /api/chat/:session/messages - run a turn, streaming it as server-sent events
///
/// Events: `delta` (answer text), `references` (retrieved records, display
/// only), `error` (turn failed; carries any partial text), `done`.
pub async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<TurnRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    if request.message.trim().is_empty() {
        return Err(Error::InvalidRequest("message must not be empty".to_string()));
    }
    if request.similarity_threshold.is_some_and(|t| !t.is_finite()) {
        return Err(Error::InvalidRequest(
            "similarity_threshold must be finite".to_string(),
        ));
    }

    let session = state.sessions().get_or_create(&session_id);
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    let pipeline = state.chat().clone();
    tokio::spawn(async move {
        // failures already reached the client as an `error` event
        let _ = pipeline.run_turn(&session, request, &tx).await;
    });

    let stream = ReceiverStream::new(rx).map(to_sse);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// GET /api/chat/:session - conversation history
pub async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<HistoryResponse> {
    let (phase, history) = match state.sessions().get(&session_id) {
        Some(session) => (session.phase(), session.history()),
        None => (TurnPhase::AwaitingInput, Vec::new()),
    };
    Json(HistoryResponse {
        session: session_id,
        phase,
        history,
    })
}

/// DELETE /api/chat/:session - cancel any running turn and clear history
pub async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if let Some(session) = state.sessions().remove(&session_id) {
        session.clear().await;
    }
    StatusCode::NO_CONTENT
}
