//! Conversation sessions
//!
//! A [`SessionHandle`] owns one conversation. Turns on a handle are serialized
//! by an async turn lock; history reads never wait for a turn. Clearing the
//! conversation bumps a cancellation generation, waits for any in-flight turn
//! to unwind, then empties the history.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, MutexGuard};

use crate::types::ChatMessage;

/// Where a session is in the turn lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    AwaitingInput,
    EmbeddingQuery,
    Retrieving,
    StreamingResponse,
    AppendingHistory,
}

/// Conversation history and turn phase
#[derive(Debug, Clone)]
pub struct ChatSession {
    history: Vec<ChatMessage>,
    phase: TurnPhase,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self {
            history: Vec::new(),
            phase: TurnPhase::AwaitingInput,
        }
    }
}

impl ChatSession {
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub(crate) fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
    }

    pub(crate) fn set_phase(&mut self, phase: TurnPhase) {
        self.phase = phase;
    }

    /// Drop everything after the first `len` messages and return to idle
    pub(crate) fn rollback(&mut self, len: usize) {
        self.history.truncate(len);
        self.phase = TurnPhase::AwaitingInput;
    }

    fn clear(&mut self) {
        self.history.clear();
        self.phase = TurnPhase::AwaitingInput;
    }
}

/// One conversation with its turn lock and cancellation signal
pub struct SessionHandle {
    id: String,
    state: Mutex<ChatSession>,
    turn: tokio::sync::Mutex<()>,
    generation: watch::Sender<u64>,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            id: id.into(),
            state: Mutex::new(ChatSession::default()),
            turn: tokio::sync::Mutex::new(()),
            generation,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of the conversation history
    pub fn history(&self) -> Vec<ChatMessage> {
        self.state.lock().history().to_vec()
    }

    pub fn phase(&self) -> TurnPhase {
        self.state.lock().phase()
    }

    /// Cancel any in-flight turn and reset the conversation
    ///
    /// Returns once the history is empty; the document store is not touched.
    pub async fn clear(&self) {
        self.generation.send_modify(|g| *g += 1);
        let _turn = self.turn.lock().await;
        self.state.lock().clear();
        tracing::info!("Session {} cleared", self.id);
    }

    /// Receiver that changes whenever the conversation is cleared
    pub(crate) fn cancellation(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// Wait for exclusive use of the session for one turn
    pub(crate) async fn begin_turn(&self) -> MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut ChatSession) -> R) -> R {
        f(&mut *self.state.lock())
    }
}

/// Live sessions by id
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing session or a fresh one
    pub fn get_or_create(&self, id: &str) -> Arc<SessionHandle> {
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!("Creating chat session {}", id);
                Arc::new(SessionHandle::new(id))
            })
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    /// Forget a session; handles already held elsewhere stay usable
    pub fn remove(&self, id: &str) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.remove(id).map(|(_, handle)| handle);
        if removed.is_some() {
            tracing::debug!("Removed chat session {}", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
