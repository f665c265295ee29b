//! Embedding provider trait for generating text embeddings

use async_trait::async_trait;
use crate::error::Result;

/// Trait for mapping text to a fixed-length vector
///
/// Implementations:
/// - `OpenAiClient`: OpenAI / Azure OpenAI embeddings endpoint
/// - `OllamaClient`: Local Ollama server (nomic-embed-text)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    ///
    /// Fails with `Error::Provider` on transport, auth or rate-limit failures.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
