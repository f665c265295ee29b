//! Similarity ranking and query-time retrieval

mod retriever;
mod search;

pub use retriever::Retriever;
pub use search::{cosine_similarity, enforce_ranking_contract, rank_by_similarity};
