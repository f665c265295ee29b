//! Ollama client for embeddings and streaming chat

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::retry::retry_with_backoff;
use crate::types::ChatMessage;

use super::completion::{CompletionProvider, DeltaStream};
use super::embedding::EmbeddingProvider;
use super::stream::{decode_deltas, response_body, LineOutcome};

/// Ollama API client with automatic retry for embeddings
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    base_url: String,
    embed_model: String,
    chat_model: String,
    temperature: f32,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.endpoint(),
            embed_model: config.embedding_model(),
            chat_model: config.chat_model(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbedRequest {
            model: &self.embed_model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::provider("embed", format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::provider(
                "embed",
                format!("Embedding failed: HTTP {}", response.status()),
            ));
        }

        let embed_response: EmbedResponse = response.json().await.map_err(|e| {
            Error::provider("embed", format!("Failed to parse embedding response: {}", e))
        })?;

        if embed_response.embedding.is_empty() {
            return Err(Error::provider("embed", "Ollama returned an empty embedding"));
        }
        Ok(embed_response.embedding)
    }
}

/// Parse one NDJSON line of an Ollama chat stream
pub(crate) fn parse_ndjson_line(line: &str) -> LineOutcome {
    if line.trim().is_empty() {
        return LineOutcome::Skip;
    }
    match serde_json::from_str::<StreamChunk>(line) {
        Ok(StreamChunk { error: Some(error), .. }) => {
            LineOutcome::Failed(Error::provider("chat stream", error))
        }
        Ok(StreamChunk { done: true, .. }) => LineOutcome::Done,
        Ok(StreamChunk { message, .. }) => {
            LineOutcome::Delta(message.map(|m| m.content).unwrap_or_default())
        }
        Err(e) => LineOutcome::Failed(Error::provider(
            "chat stream",
            format!("invalid chunk: {}", e),
        )),
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        retry_with_backoff("embed", self.max_retries, Duration::from_secs(1), || {
            self.embed_once(text)
        })
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[async_trait]
impl CompletionProvider for OllamaClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<DeltaStream> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            stream: true,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        tracing::info!("Streaming completion with model: {}", self.chat_model);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::provider("chat", format!("Stream request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::provider(
                "chat",
                format!("Stream failed: HTTP {}", response.status()),
            ));
        }

        Ok(decode_deltas(response_body(response), parse_ndjson_line))
    }

    async fn health_check(&self) -> Result<bool> {
        EmbeddingProvider::health_check(self).await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.chat_model
    }
}
