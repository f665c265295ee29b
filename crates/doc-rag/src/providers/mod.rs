//! Provider abstractions for embeddings, completion, document storage and object storage
//!
//! The pipelines only see these traits; concrete clients are chosen from configuration.

pub mod completion;
pub mod document_store;
pub mod embedding;
pub mod local;
pub mod memory;
pub mod object_storage;
pub mod ollama;
pub mod openai;
pub mod stream;

pub use completion::{CompletionProvider, DeltaStream};
pub use document_store::{DocumentStore, RecordFilter};
pub use embedding::EmbeddingProvider;
pub use local::LocalObjectStorage;
pub use memory::MemoryDocumentStore;
pub use object_storage::{ObjectStorage, StoredObject};
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
