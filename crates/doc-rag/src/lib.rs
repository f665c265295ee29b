//! doc-rag: event-driven document indexing and retrieval-augmented chat
//!
//! Documents dropped into object storage are turned into pending records in a
//! document store, a change-triggered worker embeds them, and a chat pipeline
//! retrieves the closest records to ground streamed answers.
//!
//! ```text
//! object storage ─▶ IngestionPipeline ─▶ DocumentStore ─▶ VectorizationWorker
//!                                              ▲
//!                     ChatPipeline ◀───────────┘
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod retry;
pub mod server;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::{ChatPipeline, SessionHandle, SessionRegistry, TurnEvent, TurnRequest};
pub use config::RagConfig;
pub use error::{Error, Result};
pub use ingestion::IngestionPipeline;
pub use processing::VectorizationWorker;
pub use types::{ChatMessage, DocumentRecord, ScoredRecord, StorageEvent};
