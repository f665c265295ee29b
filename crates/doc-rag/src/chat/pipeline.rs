//! Retrieval-augmented chat turns
//!
//! A turn embeds the question, retrieves records, sends the grounded prompt
//! plus history to the completion provider and forwards deltas to a sink as
//! they arrive. Only the assistant text is written to history; the reference
//! block goes to the sink alone. A failed or cancelled turn leaves history as
//! it was before the turn started.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::generation::{PromptBuilder, ReferenceBlock, BASE_INSTRUCTIONS};
use crate::providers::CompletionProvider;
use crate::retrieval::Retriever;
use crate::types::ChatMessage;

use super::session::{SessionHandle, TurnPhase};

/// A user message with optional retrieval overrides
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            similarity_threshold: None,
            top_k: None,
        }
    }
}

/// What the sink receives during a turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Next piece of assistant text
    Delta { text: String },
    /// Retrieved records, sent after the answer when any qualified
    References(ReferenceBlock),
    /// Turn failed; `partial` is the text streamed before the failure
    Failed { message: String, partial: String },
    /// Turn finished and the answer is in history
    Completed,
}

/// Result of a completed turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub answer: String,
    pub references: Option<ReferenceBlock>,
}

/// Runs chat turns against a retriever and a completion provider
#[derive(Clone)]
pub struct ChatPipeline {
    retriever: Retriever,
    completion: Arc<dyn CompletionProvider>,
    config: RetrievalConfig,
}

impl ChatPipeline {
    pub fn new(
        retriever: Retriever,
        completion: Arc<dyn CompletionProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            retriever,
            completion,
            config,
        }
    }

    fn base_instructions(&self) -> &str {
        self.config.system_prompt.as_deref().unwrap_or(BASE_INSTRUCTIONS)
    }

    /// Run one turn on `session`, streaming events into `sink`
    ///
    /// Waits for any earlier turn on the same session. Clearing the session
    /// or dropping the sink's receiver cancels the turn.
    pub async fn run_turn(
        &self,
        session: &SessionHandle,
        request: TurnRequest,
        sink: &mpsc::Sender<TurnEvent>,
    ) -> Result<TurnOutcome> {
        let mut cancel = session.cancellation();
        let turn = session.begin_turn().await;

        if matches!(cancel.has_changed(), Ok(true)) {
            tracing::info!("Turn on session {} cancelled before it started", session.id());
            return Err(Error::TurnCancelled);
        }

        let history_len = session.with_state(|s| {
            let len = s.history().len();
            s.push(ChatMessage::user(request.message.clone()));
            len
        });

        let mut answer = String::new();
        match self
            .execute(session, &request, sink, &mut cancel, &mut answer)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                session.with_state(|s| s.rollback(history_len));
                // a slow sink must not hold up a concurrent clear
                drop(turn);
                match &e {
                    Error::TurnCancelled => tracing::info!(
                        "Turn on session {} cancelled after {} chars",
                        session.id(),
                        answer.len()
                    ),
                    other => tracing::error!("Turn on session {} failed: {}", session.id(), other),
                }
                let _ = sink
                    .send(TurnEvent::Failed {
                        message: e.to_string(),
                        partial: answer,
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        session: &SessionHandle,
        request: &TurnRequest,
        sink: &mpsc::Sender<TurnEvent>,
        cancel: &mut watch::Receiver<u64>,
        answer: &mut String,
    ) -> Result<TurnOutcome> {
        let threshold = request
            .similarity_threshold
            .unwrap_or(self.config.similarity_threshold);
        let top_k = request.top_k.unwrap_or(self.config.top_k).max(1);

        session.with_state(|s| s.set_phase(TurnPhase::EmbeddingQuery));
        let embedding = until_cancelled(cancel, self.retriever.embed_query(&request.message)).await?;

        session.with_state(|s| s.set_phase(TurnPhase::Retrieving));
        let results =
            until_cancelled(cancel, self.retriever.search(&embedding, threshold, top_k)).await?;
        tracing::info!(
            "Session {}: {} records above threshold {}",
            session.id(),
            results.len(),
            threshold
        );

        let system = PromptBuilder::system_message(self.base_instructions(), &results);
        let messages: Vec<ChatMessage> = std::iter::once(ChatMessage::system(system))
            .chain(session.history())
            .collect();

        session.with_state(|s| s.set_phase(TurnPhase::StreamingResponse));
        let mut deltas = until_cancelled(cancel, self.completion.stream_chat(&messages)).await?;

        loop {
            tokio::select! {
                biased;
                _ = cancel.changed() => return Err(Error::TurnCancelled),
                _ = sink.closed() => return Err(Error::TurnCancelled),
                next = deltas.next() => match next {
                    Some(Ok(text)) => {
                        answer.push_str(&text);
                        // a full sink must not outlive a clear
                        let delta = sink.send(TurnEvent::Delta { text });
                        until_cancelled(cancel, async {
                            delta.await.map_err(|_| Error::TurnCancelled)
                        })
                        .await?;
                    }
                    Some(Err(e)) => return Err(e),
                    None => break,
                },
            }
        }

        let references = ReferenceBlock::from_results(&results);
        if let Some(block) = &references {
            let _ = sink.send(TurnEvent::References(block.clone())).await;
        }

        session.with_state(|s| {
            s.set_phase(TurnPhase::AppendingHistory);
            s.push(ChatMessage::assistant(answer.clone()));
            s.set_phase(TurnPhase::AwaitingInput);
        });
        let _ = sink.send(TurnEvent::Completed).await;

        tracing::debug!(
            "Session {} turn complete ({} chars, model {})",
            session.id(),
            answer.len(),
            self.completion.model()
        );
        Ok(TurnOutcome {
            answer: answer.clone(),
            references,
        })
    }
}

async fn until_cancelled<T>(
    cancel: &mut watch::Receiver<u64>,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.changed() => Err(Error::TurnCancelled),
        result = operation => result,
    }
}
