//! Configuration for the indexing and chat services

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Object-storage ingestion configuration
    pub ingestion: IngestionConfig,
    /// Change-feed vectorization configuration
    pub vectorization: VectorizationConfig,
    /// Retrieval and prompt configuration
    pub retrieval: RetrievalConfig,
    /// Embedding/completion provider configuration
    pub provider: ProviderConfig,
    /// Document store configuration
    pub store: StoreConfig,
    /// Local object storage configuration
    pub storage: StorageConfig,
}

impl RagConfig {
    /// Load configuration: optional TOML file, then environment overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse TOML configuration text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Apply `DOC_RAG_*` environment overrides using the given lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DOC_RAG_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("DOC_RAG_PORT") {
            self.server.port = parse_env("DOC_RAG_PORT", &port)?;
        }
        if let Some(container) = lookup("DOC_RAG_CONTAINER") {
            self.ingestion.container = container;
        }
        if let Some(threshold) = lookup("DOC_RAG_SIMILARITY_THRESHOLD") {
            self.retrieval.similarity_threshold =
                parse_env("DOC_RAG_SIMILARITY_THRESHOLD", &threshold)?;
        }
        if let Some(backend) = lookup("DOC_RAG_PROVIDER") {
            self.provider.backend = match backend.to_lowercase().as_str() {
                "openai" => ProviderBackend::OpenAi,
                "ollama" => ProviderBackend::Ollama,
                other => {
                    return Err(Error::Config(format!("Unknown provider backend '{}'", other)))
                }
            };
        }
        if let Some(endpoint) = lookup("DOC_RAG_PROVIDER_ENDPOINT") {
            self.provider.endpoint = Some(endpoint);
        }
        if let Some(key) = lookup("DOC_RAG_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.provider.api_key = Some(key);
        }
        if let Some(version) = lookup("DOC_RAG_API_VERSION") {
            self.provider.api_version = Some(version);
        }
        if let Some(model) = lookup("DOC_RAG_EMBEDDING_MODEL") {
            self.provider.embedding_model = Some(model);
        }
        if let Some(model) = lookup("DOC_RAG_CHAT_MODEL") {
            self.provider.chat_model = Some(model);
        }
        if let Some(path) = lookup("DOC_RAG_STORE_PATH") {
            self.store.backend = StoreBackend::Sqlite;
            self.store.path = PathBuf::from(path);
        }
        if let Some(root) = lookup("DOC_RAG_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        Ok(())
    }

    /// Check required endpoints/credentials and value ranges
    pub fn validate(&self) -> Result<()> {
        if self.ingestion.container.trim().is_empty() {
            return Err(Error::Config("ingestion.container must not be empty".to_string()));
        }
        if let PageSplitConfig::Paragraphs { max_chars } = self.ingestion.page_split {
            if max_chars == 0 {
                return Err(Error::Config("page_split.max_chars must be positive".to_string()));
            }
        }
        if !self.retrieval.similarity_threshold.is_finite() {
            return Err(Error::Config("retrieval.similarity_threshold must be finite".to_string()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if self.vectorization.max_batch_size == 0 {
            return Err(Error::Config("vectorization.max_batch_size must be at least 1".to_string()));
        }

        match self.provider.backend {
            ProviderBackend::OpenAi => {
                if self.provider.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                    return Err(Error::Config(
                        "provider.api_key is required for the openai backend (set DOC_RAG_API_KEY or OPENAI_API_KEY)"
                            .to_string(),
                    ));
                }
                if self.provider.api_version.is_some() && self.provider.endpoint.is_none() {
                    return Err(Error::Config(
                        "provider.endpoint is required for Azure OpenAI deployments".to_string(),
                    ));
                }
            }
            ProviderBackend::Ollama => {}
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value for {}: '{}'", key, value)))
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// How deleted sources are removed from the store
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeletionMode {
    /// Remove records outright
    #[default]
    Hard,
    /// Keep records with `delete_flag = true`
    Soft,
}

/// Page-splitting strategy for multi-page sources
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PageSplitConfig {
    /// Whole text as one page (`page_number = 0`)
    #[default]
    Whole,
    /// Pack paragraphs into pages of at most `max_chars`
    Paragraphs { max_chars: usize },
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Object-storage container watched for documents
    pub container: String,
    /// Extensions (without dot) that are indexed
    pub supported_extensions: Vec<String>,
    /// Page-splitting strategy
    pub page_split: PageSplitConfig,
    /// Hard or soft deletion
    pub deletion_mode: DeletionMode,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            container: "rag-docs".to_string(),
            supported_extensions: vec!["txt".to_string(), "md".to_string()],
            page_split: PageSplitConfig::Whole,
            deletion_mode: DeletionMode::Hard,
        }
    }
}

/// Vectorization worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizationConfig {
    /// Maximum records handled per change batch
    pub max_batch_size: usize,
    /// Redelivery attempts for a failed batch
    pub max_redeliveries: u32,
    /// Base delay before redelivering a failed batch (doubles per attempt)
    pub redelivery_backoff_ms: u64,
    /// Process records still flagged for vectorization when the worker starts
    pub sweep_on_start: bool,
}

impl Default for VectorizationConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 32,
            max_redeliveries: 3,
            redelivery_backoff_ms: 1000,
            sweep_on_start: true,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Records must score strictly above this to be used
    pub similarity_threshold: f32,
    /// Maximum records placed in the prompt
    pub top_k: usize,
    /// Replaces the built-in base instruction text
    pub system_prompt: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            top_k: 10,
            system_prompt: None,
        }
    }
}

/// Provider backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBackend {
    /// OpenAI-compatible API (including Azure OpenAI deployments)
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// Local Ollama server
    Ollama,
}

/// Embedding/completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Backend
    pub backend: ProviderBackend,
    /// Base URL; backend default when unset
    pub endpoint: Option<String>,
    /// API key (OpenAI backend)
    pub api_key: Option<String>,
    /// Azure OpenAI API version; switches to deployment-style URLs
    pub api_version: Option<String>,
    /// Embedding model or deployment name
    pub embedding_model: Option<String>,
    /// Chat model or deployment name
    pub chat_model: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Transport retries for embedding requests
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: ProviderBackend::OpenAi,
            endpoint: None,
            api_key: None,
            api_version: None,
            embedding_model: None,
            chat_model: None,
            temperature: 0.3,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

impl ProviderConfig {
    /// Endpoint with the backend default applied
    pub fn endpoint(&self) -> String {
        let endpoint = self.endpoint.clone().unwrap_or_else(|| match self.backend {
            ProviderBackend::OpenAi => "https://api.openai.com/v1".to_string(),
            ProviderBackend::Ollama => "http://localhost:11434".to_string(),
        });
        endpoint.trim_end_matches('/').to_string()
    }

    /// Embedding model with the backend default applied
    pub fn embedding_model(&self) -> String {
        self.embedding_model.clone().unwrap_or_else(|| match self.backend {
            ProviderBackend::OpenAi => "text-embedding-3-small".to_string(),
            ProviderBackend::Ollama => "nomic-embed-text".to_string(),
        })
    }

    /// Chat model with the backend default applied
    pub fn chat_model(&self) -> String {
        self.chat_model.clone().unwrap_or_else(|| match self.backend {
            ProviderBackend::OpenAi => "gpt-4o-mini".to_string(),
            ProviderBackend::Ollama => "llama3.2".to_string(),
        })
    }
}

/// Document store backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process map (lost on restart)
    Memory,
    /// SQLite file
    #[default]
    Sqlite,
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend
    pub backend: StoreBackend,
    /// SQLite database path
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: data_dir().join("records.db"),
        }
    }
}

/// Local object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; containers are its subdirectories
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: data_dir().join("objects"),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("doc-rag")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.ingestion.container, "rag-docs");
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.ingestion.page_split, PageSplitConfig::Whole);
        assert_eq!(config.ingestion.deletion_mode, DeletionMode::Hard);
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let config = RagConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RagConfig::default();
        config
            .apply_env_overrides(lookup(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("DOC_RAG_SIMILARITY_THRESHOLD", "0.75"),
                ("DOC_RAG_CONTAINER", "docs"),
                ("DOC_RAG_PORT", "9000"),
            ]))
            .unwrap();

        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.retrieval.similarity_threshold, 0.75);
        assert_eq!(config.ingestion.container, "docs");
        assert_eq!(config.server.port, 9000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_env_value_is_config_error() {
        let mut config = RagConfig::default();
        let err = config
            .apply_env_overrides(lookup(&[("DOC_RAG_SIMILARITY_THRESHOLD", "high")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_azure_requires_endpoint() {
        let mut config = RagConfig::default();
        config.provider.api_key = Some("key".to_string());
        config.provider.api_version = Some("2024-06-01".to_string());
        assert!(config.validate().is_err());

        config.provider.endpoint = Some("https://example.openai.azure.com".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_sections() {
        let config = RagConfig::from_toml_str(
            r#"
            [ingestion]
            container = "manuals"
            deletion_mode = "soft"

            [ingestion.page_split]
            strategy = "paragraphs"
            max_chars = 2000

            [provider]
            backend = "ollama"

            [store]
            backend = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.ingestion.container, "manuals");
        assert_eq!(config.ingestion.deletion_mode, DeletionMode::Soft);
        assert_eq!(
            config.ingestion.page_split,
            PageSplitConfig::Paragraphs { max_chars: 2000 }
        );
        assert_eq!(config.provider.backend, ProviderBackend::Ollama);
        assert_eq!(config.provider.endpoint(), "http://localhost:11434");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.validate().is_ok());
    }
}
