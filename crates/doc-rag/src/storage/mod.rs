//! Persistent document storage and its change feed

mod change_feed;
mod database;

pub use change_feed::{ChangeEvent, ChangeFeed, ObservedStore, DEFAULT_FEED_CAPACITY};
pub use database::{RecordDb, SqliteDocumentStore};
