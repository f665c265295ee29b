//! Core types for the indexing and chat pipelines

pub mod chat;
pub mod event;
pub mod record;

pub use chat::{ChatMessage, Role};
pub use event::{StorageEvent, StorageEventKind};
pub use record::{ContentKind, DocumentRecord, RecordFields, ScoredRecord};
