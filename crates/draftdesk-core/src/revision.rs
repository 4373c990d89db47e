//! Revision chain resolution for multi-page drafts.
//!
//! A stored draft lists its pages final-first: the accepted text on the
//! first page, the earliest draft on the last. Reviewer comments sit on the
//! page they were written against, so a page's comments are the feedback
//! that produced the *next* revision in time.
//!
//! ```text
//! stored:         [final {A}] [mid {B}] [first {}]
//! chronological:  first ──{}──▶ mid ──{B}──▶ final      pending: {A}
//! ```

use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::models::{Page, PageComment};

/// A step from one revision to the next, with the feedback that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from_page: usize,
    pub to_page: usize,
    pub feedback: Vec<PageComment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionChain {
    /// Earliest draft first.
    pub chronological: Vec<Page>,
    pub final_revision: Page,
    pub transitions: Vec<Transition>,
    /// Comments on the final page; no later revision addresses them.
    pub pending_feedback: Vec<PageComment>,
}

impl RevisionChain {
    /// Text a new editing session may start from.
    pub fn seed_text(&self) -> &str {
        &self.final_revision.content
    }

    /// Every reviewer comment in the chain, oldest revision first.
    pub fn all_feedback(&self) -> impl Iterator<Item = &PageComment> {
        self.chronological.iter().flat_map(|p| p.comments.iter())
    }
}

/// Resolve stored pages (final-first) into a chronological chain.
pub fn resolve(pages: &[Page]) -> Result<RevisionChain> {
    if pages.is_empty() {
        return Err(malformed("draft has no pages"));
    }

    let finals = pages.iter().filter(|p| p.is_final).count();
    if finals != 1 {
        return Err(malformed(format!(
            "expected exactly one final page, found {}",
            finals
        )));
    }
    let firsts = pages.iter().filter(|p| p.is_first_draft).count();
    if firsts != 1 {
        return Err(malformed(format!(
            "expected exactly one first draft, found {}",
            firsts
        )));
    }
    if !pages[0].is_final {
        return Err(malformed("final page is not stored first"));
    }
    if !pages[pages.len() - 1].is_first_draft {
        return Err(malformed("first draft is not stored last"));
    }

    let chronological: Vec<Page> = pages.iter().rev().cloned().collect();
    let transitions = chronological
        .windows(2)
        .map(|pair| Transition {
            from_page: pair[0].page_number,
            to_page: pair[1].page_number,
            feedback: pair[0].comments.clone(),
        })
        .collect();
    let final_revision = pages[0].clone();
    let pending_feedback = final_revision.comments.clone();

    Ok(RevisionChain {
        chronological,
        final_revision,
        transitions,
        pending_feedback,
    })
}

fn malformed(reason: impl Into<String>) -> CoreError {
    CoreError::MalformedRevisionChain(reason.into())
}
