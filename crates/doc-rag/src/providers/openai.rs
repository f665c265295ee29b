//! OpenAI-compatible client for embeddings and streaming chat
//!
//! Works against api.openai.com-style endpoints and Azure OpenAI deployments
//! (selected by setting `provider.api_version`).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::retry::retry_with_backoff;
use crate::types::ChatMessage;

use super::completion::{CompletionProvider, DeltaStream};
use super::embedding::EmbeddingProvider;
use super::stream::{decode_deltas, response_body, LineOutcome};

/// OpenAI / Azure OpenAI API client
pub struct OpenAiClient {
    client: Client,
    embeddings_url: String,
    chat_url: String,
    models_url: String,
    embedding_model: String,
    chat_model: String,
    temperature: f32,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a client from provider configuration
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("missing OpenAI API key".to_string()))?;

        let endpoint = config.endpoint();
        let embedding_model = config.embedding_model();
        let chat_model = config.chat_model();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let (embeddings_url, chat_url, models_url) = match &config.api_version {
            Some(version) => {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(api_key)
                        .map_err(|_| Error::Config("invalid Azure OpenAI API key".to_string()))?,
                );
                (
                    format!(
                        "{}/openai/deployments/{}/embeddings?api-version={}",
                        endpoint, embedding_model, version
                    ),
                    format!(
                        "{}/openai/deployments/{}/chat/completions?api-version={}",
                        endpoint, chat_model, version
                    ),
                    format!("{}/openai/models?api-version={}", endpoint, version),
                )
            }
            None => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", api_key))
                        .map_err(|_| Error::Config("invalid OpenAI API key".to_string()))?,
                );
                (
                    format!("{}/embeddings", endpoint),
                    format!("{}/chat/completions", endpoint),
                    format!("{}/models", endpoint),
                )
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            embeddings_url,
            chat_url,
            models_url,
            embedding_model,
            chat_model,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };

        let response = self
            .client
            .post(&self.embeddings_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::provider("embed", format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("embed", status, &body));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::provider("embed", format!("invalid response: {}", e)))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::provider("embed", "response contained no embedding"))
    }
}

fn status_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "authentication failed",
        StatusCode::TOO_MANY_REQUESTS => "rate limited",
        _ => "request rejected",
    };
    Error::provider(operation, format!("{} (HTTP {}): {}", kind, status, body))
}

/// Parse one server-sent-events line of a chat completion stream
pub(crate) fn parse_sse_line(line: &str) -> LineOutcome {
    let Some(payload) = line.strip_prefix("data:") else {
        return LineOutcome::Skip;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return LineOutcome::Done;
    }
    if payload.is_empty() {
        return LineOutcome::Skip;
    }

    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            return LineOutcome::Failed(Error::provider(
                "chat stream",
                format!("invalid chunk: {}", e),
            ))
        }
    };
    if let Some(error) = value.get("error") {
        return LineOutcome::Failed(Error::provider("chat stream", error.to_string()));
    }

    match serde_json::from_value::<ChatChunk>(value) {
        Ok(chunk) => {
            let text: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            LineOutcome::Delta(text)
        }
        Err(e) => LineOutcome::Failed(Error::provider("chat stream", format!("invalid chunk: {}", e))),
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        retry_with_backoff("embed", self.max_retries, Duration::from_secs(1), || {
            self.embed_once(text)
        })
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.get(&self.models_url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<DeltaStream> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            temperature: self.temperature,
            stream: true,
        };

        tracing::info!("Streaming completion with model: {}", self.chat_model);

        let response = self
            .client
            .post(&self.chat_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::provider("chat", format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("chat", status, &body));
        }

        Ok(decode_deltas(response_body(response), parse_sse_line))
    }

    async fn health_check(&self) -> Result<bool> {
        EmbeddingProvider::health_check(self).await
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.chat_model
    }
}
