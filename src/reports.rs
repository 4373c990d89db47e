//! `draftdesk reports` and `draftdesk drafts`: browse the corpus from the terminal.

use anyhow::{bail, Result};
use std::fmt::Write as _;

use crate::config::Config;
use crate::corpus::{Corpus, FsCorpus};
use crate::models::DraftDetail;

pub async fn run_reports(config: &Config) -> Result<()> {
    let corpus = FsCorpus::new(&config.corpus)?;
    let reports = corpus.completed_list().await?;
    if reports.is_empty() {
        println!("No completed reports in {}", config.corpus.completed_dir.display());
        return Ok(());
    }

    println!("{:<24} {}", "ID", "TITLE");
    for report in &reports {
        println!("{:<24} {}", report.id, report.title);
    }
    Ok(())
}

pub async fn run_drafts(config: &Config, id: Option<&str>) -> Result<()> {
    let corpus = FsCorpus::new(&config.corpus)?;

    let Some(id) = id else {
        let drafts = corpus.drafts().await?;
        if drafts.is_empty() {
            println!("No drafts in {}", config.corpus.drafts_dir.display());
            return Ok(());
        }
        println!("{:<24} {:>5}  {}", "ID", "PAGES", "FILE");
        for draft in &drafts {
            println!("{:<24} {:>5}  {}", draft.id, draft.page_count, draft.filename);
        }
        return Ok(());
    };

    let Some(draft) = corpus.draft(id).await? else {
        bail!("draft not found: {}", id);
    };
    let detail = DraftDetail::resolve(draft)?;
    print!("{}", describe(&detail));
    Ok(())
}

/// Human-readable revision history, earliest draft first.
pub fn describe(detail: &DraftDetail) -> String {
    let chain = &detail.revisions;
    let mut out = String::new();
    let _ = writeln!(out, "{} ({} pages)", detail.filename, detail.page_count);

    for transition in &chain.transitions {
        let _ = writeln!(
            out,
            "  page {} -> page {}: {} comment(s)",
            transition.from_page,
            transition.to_page,
            transition.feedback.len()
        );
        for comment in &transition.feedback {
            let _ = writeln!(out, "    [{}] {}", comment.author, comment.text);
        }
    }

    if !chain.pending_feedback.is_empty() {
        let _ = writeln!(out, "  pending on final revision:");
        for comment in &chain.pending_feedback {
            let _ = writeln!(out, "    [{}] {}", comment.author, comment.text);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", chain.seed_text());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Draft;
    use draftdesk_core::models::{Page, PageComment};

    fn page(
        n: usize,
        content: &str,
        comments: &[&str],
        is_first_draft: bool,
        is_final: bool,
    ) -> Page {
        Page {
            page_number: n,
            content: content.to_string(),
            comments: comments
                .iter()
                .map(|t| PageComment {
                    author: "kim".to_string(),
                    text: t.to_string(),
                })
                .collect(),
            is_first_draft,
            is_final,
        }
    }

    #[test]
    fn test_describe_lists_transitions_in_time_order() {
        let draft = Draft {
            id: "weekly".to_string(),
            filename: "weekly.docx".to_string(),
            pages: vec![
                page(1, "final body", &["ship it"], false, true),
                page(2, "mid body", &["add numbers"], false, false),
                page(3, "first body", &[], true, false),
            ],
        };
        let text = describe(&DraftDetail::resolve(draft).unwrap());

        let first = text.find("page 3 -> page 2: 0 comment(s)").unwrap();
        let second = text.find("page 2 -> page 1: 1 comment(s)").unwrap();
        assert!(first < second);
        assert!(text.contains("[kim] add numbers"));
        assert!(text.contains("pending on final revision:\n    [kim] ship it"));
        assert!(text.trim_end().ends_with("final body"));
    }
}
