//! doc-rag server binary
//!
//! Run with: cargo run -p doc-rag --bin doc-rag-server
//! Configuration: optional TOML file named by `DOC_RAG_CONFIG`, then `DOC_RAG_*` overrides.

use doc_rag::{config::RagConfig, server::RagServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var_os("DOC_RAG_CONFIG").map(PathBuf::from);
    let config = match RagConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - Provider: {:?} at {}", config.provider.backend, config.provider.endpoint());
    tracing::info!("  - Embedding model: {}", config.provider.embedding_model());
    tracing::info!("  - Chat model: {}", config.provider.chat_model());
    tracing::info!("  - Store: {:?}", config.store.backend);
    tracing::info!("  - Container: {}", config.ingestion.container);
    tracing::info!("  - Similarity threshold: {}", config.retrieval.similarity_threshold);

    let server = RagServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST   /api/events/storage          - Object-storage notifications");
    println!("  POST   /api/chat/:session/messages  - Ask questions (server-sent events)");
    println!("  DELETE /api/chat/:session           - Clear a conversation");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
