//! Page splitting strategies
//!
//! A splitter turns the decoded body of a source into pages; each page becomes
//! one record sharing the source's `file_path`, numbered from 0.

use crate::config::PageSplitConfig;

/// Splits a document body into pages
pub trait PageSplitter: Send + Sync {
    /// Split `text` into at least one page
    fn split(&self, text: &str) -> Vec<String>;

    fn name(&self) -> &str;
}

/// Build the splitter selected by configuration
pub fn splitter_from_config(config: &PageSplitConfig) -> Box<dyn PageSplitter> {
    match config {
        PageSplitConfig::Whole => Box::new(WholeDocument),
        PageSplitConfig::Paragraphs { max_chars } => Box::new(ParagraphWindow::new(*max_chars)),
    }
}

/// The whole body is a single page
#[derive(Debug, Default, Clone, Copy)]
pub struct WholeDocument;

impl PageSplitter for WholeDocument {
    fn split(&self, text: &str) -> Vec<String> {
        vec![text.to_string()]
    }

    fn name(&self) -> &str {
        "whole"
    }
}

/// Packs blank-line separated paragraphs into pages of at most `max_chars`
///
/// A paragraph longer than `max_chars` is cut at character boundaries.
#[derive(Debug, Clone, Copy)]
pub struct ParagraphWindow {
    max_chars: usize,
}

impl ParagraphWindow {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }
}

impl PageSplitter for ParagraphWindow {
    fn split(&self, text: &str) -> Vec<String> {
        let normalized = text.replace("\r\n", "\n");
        let mut pages = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for paragraph in normalized.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            for piece in cut_chars(paragraph, self.max_chars) {
                let piece_len = piece.chars().count();
                let joined_len = if current.is_empty() {
                    piece_len
                } else {
                    current_len + 2 + piece_len
                };

                if joined_len > self.max_chars && !current.is_empty() {
                    pages.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                if !current.is_empty() {
                    current.push_str("\n\n");
                    current_len += 2;
                }
                current.push_str(piece);
                current_len += piece_len;
            }
        }

        if !current.is_empty() || pages.is_empty() {
            pages.push(current);
        }
        pages
    }

    fn name(&self) -> &str {
        "paragraphs"
    }
}

fn cut_chars(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut count = 0usize;
    for (i, _) in text.char_indices() {
        if count == max_chars {
            pieces.push(&text[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    pieces.push(&text[start..]);
    pieces
}
