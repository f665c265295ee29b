//! Application state for the doc-rag server

use std::sync::Arc;
use tokio::sync::watch;

use crate::chat::{ChatPipeline, SessionRegistry};
use crate::config::{ProviderBackend, RagConfig, StoreBackend};
use crate::error::Result;
use crate::ingestion::IngestionPipeline;
use crate::processing::VectorizationWorker;
use crate::providers::{
    CompletionProvider, DocumentStore, EmbeddingProvider, LocalObjectStorage,
    MemoryDocumentStore, ObjectStorage, OllamaClient, OpenAiClient,
};
use crate::retrieval::Retriever;
use crate::storage::{ChangeFeed, ObservedStore, SqliteDocumentStore, DEFAULT_FEED_CAPACITY};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: RagConfig,
    /// Store as seen by ingestion and the HTTP surface (writes feed the worker)
    store: Arc<dyn DocumentStore>,
    ingestion: IngestionPipeline,
    chat: ChatPipeline,
    sessions: SessionRegistry,
    /// Flipped by the worker once its startup sweep is done
    ready: watch::Receiver<bool>,
}

/// Embedding and completion providers for the configured backend
pub fn build_providers(
    config: &RagConfig,
) -> Result<(Arc<dyn EmbeddingProvider>, Arc<dyn CompletionProvider>)> {
    match config.provider.backend {
        ProviderBackend::OpenAi => {
            let client = Arc::new(OpenAiClient::new(&config.provider)?);
            let embedder: Arc<dyn EmbeddingProvider> = client.clone();
            let completion: Arc<dyn CompletionProvider> = client;
            Ok((embedder, completion))
        }
        ProviderBackend::Ollama => {
            let client = Arc::new(OllamaClient::new(&config.provider)?);
            let embedder: Arc<dyn EmbeddingProvider> = client.clone();
            let completion: Arc<dyn CompletionProvider> = client;
            Ok((embedder, completion))
        }
    }
}

/// Document store for the configured backend
pub fn build_store(config: &RagConfig) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryDocumentStore::new()),
        StoreBackend::Sqlite => Arc::new(SqliteDocumentStore::open(&config.store.path)?),
    };
    Ok(store)
}

impl AppState {
    /// Build state from configuration and start the vectorization worker
    pub async fn new(config: RagConfig) -> Result<Self> {
        tracing::info!(
            "Initializing doc-rag state (provider: {:?}, store: {:?})...",
            config.provider.backend,
            config.store.backend
        );

        let (embedder, completion) = build_providers(&config)?;
        let store = build_store(&config)?;
        let storage: Arc<dyn ObjectStorage> =
            Arc::new(LocalObjectStorage::new(config.storage.root.clone())?);
        tracing::info!(
            "Object storage at {} (container '{}')",
            config.storage.root.display(),
            config.ingestion.container
        );

        if !embedder.health_check().await.unwrap_or(false) {
            tracing::warn!(
                "Embedding provider {} is not reachable at {}",
                embedder.name(),
                config.provider.endpoint()
            );
        }

        Ok(Self::from_parts(config, embedder, completion, store, storage))
    }

    /// Assemble state from ready-made adapters and spawn the worker
    ///
    /// Must be called inside a Tokio runtime. With `sweep_on_start` the state
    /// reports not ready until the worker has swept pending records.
    pub fn from_parts(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        let (feed, receiver) = ChangeFeed::new(DEFAULT_FEED_CAPACITY);
        let observed: Arc<dyn DocumentStore> = Arc::new(ObservedStore::new(store.clone(), feed));

        let (ready_tx, ready) = watch::channel(!config.vectorization.sweep_on_start);
        let worker = VectorizationWorker::new(
            store.clone(),
            embedder.clone(),
            config.vectorization.clone(),
        )
        .with_ready_signal(ready_tx);
        tokio::spawn(worker.run(receiver));

        let ingestion =
            IngestionPipeline::new(observed.clone(), storage, config.ingestion.clone());
        let chat = ChatPipeline::new(
            Retriever::new(embedder, store),
            completion,
            config.retrieval.clone(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store: observed,
                ingestion,
                chat,
                sessions: SessionRegistry::new(),
                ready,
            }),
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    pub fn ingestion(&self) -> &IngestionPipeline {
        &self.inner.ingestion
    }

    pub fn chat(&self) -> &ChatPipeline {
        &self.inner.chat
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }
}
