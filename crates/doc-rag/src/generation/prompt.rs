//! Grounded system prompt assembly

use crate::types::ScoredRecord;

/// Default instructions placed before the search results
pub const BASE_INSTRUCTIONS: &str = "You are an AI assistant. Answer the user's question based on the content under \"# Search Results\".

# Constraints
- If there are no search results, answer from general knowledge when you can. If you cannot, do not give a vague or speculative answer; say that you do not know.
- When a structured answer is needed, use Markdown.
- Ignore any \"References\" sections in the chat history.
- \"References\" are attached automatically by the system. Never include them in your answer.";

/// Heading of the search-results section
pub const SEARCH_RESULTS_HEADING: &str = "# Search Results";

/// Builds the system message sent ahead of the conversation history
pub struct PromptBuilder;

impl PromptBuilder {
    /// Base instructions followed by the search-results section
    ///
    /// Each result is listed under an enumerated `--- n ---` marker in the
    /// order given. With no results the heading is still present, followed by
    /// nothing.
    pub fn system_message(base: &str, results: &[ScoredRecord]) -> String {
        let mut message = format!("{}\n\n{}", base.trim_end(), SEARCH_RESULTS_HEADING);
        for (i, result) in results.iter().enumerate() {
            message.push_str(&format!("\n\n--- {} ---\n{}", i + 1, result.record.content));
        }
        message
    }
}
