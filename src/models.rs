//! Wire-level data models served by the CLI and HTTP API.
//!
//! Core types ([`Document`](draftdesk_core::models::Document),
//! [`Page`](draftdesk_core::models::Page)) come from `draftdesk-core`; the
//! types here add file-level metadata and the shapes clients consume.

use draftdesk_core::models::Page;
use draftdesk_core::revision::{resolve, RevisionChain};
use serde::{Deserialize, Serialize};

/// Listing entry for a completed report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedReport {
    pub id: String,
    pub filename: String,
    pub title: String,
}

/// A completed report with its full text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedReportContent {
    pub id: String,
    pub filename: String,
    pub title: String,
    pub content: String,
}

/// Listing entry for a multi-page draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSummary {
    pub id: String,
    pub filename: String,
    pub page_count: usize,
}

/// A draft with its stored pages, final revision first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    pub filename: String,
    pub pages: Vec<Page>,
}

impl Draft {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn summary(&self) -> DraftSummary {
        DraftSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            page_count: self.page_count(),
        }
    }
}

/// `GET /api/reports/drafts/{id}` body: stored pages plus the resolved chain.
#[derive(Debug, Clone, Serialize)]
pub struct DraftDetail {
    pub id: String,
    pub filename: String,
    pub page_count: usize,
    pub pages: Vec<Page>,
    pub revisions: RevisionChain,
}

impl DraftDetail {
    /// Resolve the draft's revision chain.
    pub fn resolve(draft: Draft) -> draftdesk_core::error::Result<Self> {
        let revisions = resolve(&draft.pages)?;
        Ok(Self {
            id: draft.id,
            filename: draft.filename,
            page_count: draft.pages.len(),
            pages: draft.pages,
            revisions,
        })
    }
}

/// One related report, as returned by search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedReport {
    pub document_id: String,
    pub title: String,
    /// Cosine similarity rounded to four decimals.
    pub score: f64,
    pub snippet: String,
}

/// Structured reply from the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReply {
    pub chat_message: String,
    /// Full replacement text for the document, when the model produced one.
    #[serde(default)]
    pub report_content: Option<String>,
}
