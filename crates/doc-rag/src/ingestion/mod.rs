//! Ingestion: object-storage notifications into pending document records

mod keywords;
mod pipeline;
mod splitter;

pub use keywords::extract_keywords;
pub use pipeline::{BackfillReport, IngestOutcome, IngestionPipeline};
pub use splitter::{splitter_from_config, PageSplitter, ParagraphWindow, WholeDocument};
