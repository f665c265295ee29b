//! Completion provider trait for streaming chat answers

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::types::ChatMessage;

/// Lazy, finite, non-restartable sequence of text deltas
pub type DeltaStream = BoxStream<'static, Result<String>>;

/// Trait for streaming chat completion
///
/// Implementations:
/// - `OpenAiClient`: chat completions with server-sent events
/// - `OllamaClient`: `/api/chat` with NDJSON streaming
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Start a streaming completion for the given messages
    ///
    /// Errors before the first delta are returned directly; errors after
    /// that arrive as an `Err` item in the stream, which then ends.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<DeltaStream>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
