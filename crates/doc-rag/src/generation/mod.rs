//! Prompt assembly and the reference block shown beside answers

pub mod citation;
pub mod prompt;

pub use citation::{Reference, ReferenceBlock, REFERENCES_HEADING};
pub use prompt::{PromptBuilder, BASE_INSTRUCTIONS, SEARCH_RESULTS_HEADING};
