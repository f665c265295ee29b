//! Reference block shown beside an answer
//!
//! The block is for display only and is never written to conversation history.

use serde::Serialize;

use crate::types::ScoredRecord;

/// Heading line of the rendered block
pub const REFERENCES_HEADING: &str = "#### References";

/// One retrieved record as listed to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reference {
    /// 1-based position in retrieval order
    pub index: usize,
    pub file_name: String,
    pub page_number: u32,
    /// Similarity score
    pub score: f32,
}

/// References for one answer, in retrieval order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceBlock {
    pub references: Vec<Reference>,
}

impl ReferenceBlock {
    /// Build from retrieval results; `None` when nothing was retrieved
    pub fn from_results(results: &[ScoredRecord]) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        let references = results
            .iter()
            .enumerate()
            .map(|(i, r)| Reference {
                index: i + 1,
                file_name: r.record.file_name.clone(),
                page_number: r.record.page_number,
                score: r.score,
            })
            .collect();
        Some(Self { references })
    }

    /// Markdown rendering appended after the streamed answer
    pub fn render(&self) -> String {
        let mut out = format!("\n\n---\n{}", REFERENCES_HEADING);
        for r in &self.references {
            out.push_str(&format!(
                "\n{}. {}  (page{})  : {}",
                r.index, r.file_name, r.page_number, r.score
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::searchable_record;

    #[test]
    fn test_render_lists_results_in_order() {
        let results = vec![
            ScoredRecord {
                record: searchable_record("guide.md", "x", vec![1.0]),
                score: 0.95,
            },
            ScoredRecord {
                record: searchable_record("faq.txt", "y", vec![1.0]),
                score: 0.82,
            },
        ];
        let block = ReferenceBlock::from_results(&results).unwrap();
        assert_eq!(block.references.len(), 2);
        assert_eq!(block.references[0].index, 1);
        assert_eq!(
            block.render(),
            "\n\n---\n#### References\n1. guide.md  (page0)  : 0.95\n2. faq.txt  (page0)  : 0.82"
        );
    }

    #[test]
    fn test_no_results_no_block() {
        assert!(ReferenceBlock::from_results(&[]).is_none());
    }
}
