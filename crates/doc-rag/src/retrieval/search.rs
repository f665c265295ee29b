//! Cosine ranking shared by the document store backends

use std::cmp::Ordering;

use crate::types::{DocumentRecord, ScoredRecord};

/// Cosine similarity in [-1, 1]; `None` when the vectors cannot be compared
///
/// Empty vectors, mismatched dimensions and zero-magnitude vectors are not
/// comparable; such records are skipped rather than scored.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    Some(dot / denom)
}

fn best_first(a: &ScoredRecord, b: &ScoredRecord) -> Ordering {
    b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
}

/// Score searchable records against `query` and keep the best `top_k` above `threshold`
pub fn rank_by_similarity<'a, I>(
    records: I,
    query: &[f32],
    threshold: f32,
    top_k: usize,
) -> Vec<ScoredRecord>
where
    I: IntoIterator<Item = &'a DocumentRecord>,
{
    let mut scored: Vec<ScoredRecord> = records
        .into_iter()
        .filter(|r| r.is_searchable())
        .filter_map(|r| {
            cosine_similarity(query, &r.vector).map(|score| ScoredRecord {
                record: r.clone(),
                score,
            })
        })
        .filter(|s| s.score > threshold)
        .collect();

    scored.sort_by(best_first);
    scored.truncate(top_k);
    scored
}

/// Re-apply the strict-threshold, best-first, at-most-`top_k` contract to store output
pub fn enforce_ranking_contract(
    mut results: Vec<ScoredRecord>,
    threshold: f32,
    top_k: usize,
) -> Vec<ScoredRecord> {
    let before = results.len();
    results.retain(|r| r.score > threshold && r.record.is_searchable());
    if results.len() != before {
        tracing::warn!(
            "Store returned {} records violating the similarity contract; dropped",
            before - results.len()
        );
    }
    results.sort_by(best_first);
    results.truncate(top_k);
    results
}
