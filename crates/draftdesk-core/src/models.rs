//! Core data models shared by the retrieval and revision pipelines.
//!
//! These are immutable inputs produced by a corpus loader. Session-scoped
//! types (comments, runs) live in [`crate::annotate`].

use serde::{Deserialize, Serialize};

/// A completed document in the retrieval corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier (the file stem for on-disk corpora).
    pub id: String,
    /// First non-empty line of the document, or the id.
    pub title: String,
    /// Full text as stored.
    pub raw_text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            raw_text: raw_text.into(),
        }
    }

    /// Build a document whose title is derived from its text.
    pub fn from_text(id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let id = id.into();
        let raw_text = raw_text.into();
        let title = derive_title(&raw_text).unwrap_or_else(|| id.clone());
        Self { id, title, raw_text }
    }
}

/// First non-empty trimmed line of `text`.
pub fn derive_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Reviewer feedback attached to a stored draft page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageComment {
    pub author: String,
    pub text: String,
}

/// One stored page of a multi-page draft.
///
/// Pages are stored with the final accepted text first and the earliest
/// draft last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page_number: usize,
    pub content: String,
    pub comments: Vec<PageComment>,
    pub is_first_draft: bool,
    pub is_final: bool,
}
