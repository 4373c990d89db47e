//! Read-only report corpus.
//!
//! The corpus has two halves:
//!
//! - **completed reports**, plain-text files that feed the retrieval index
//!   and serve as writing references;
//! - **drafts**, multi-page `.docx` files holding a report's revisions and
//!   the reviewer comments that drove them.
//!
//! [`Corpus`] abstracts over where they come from. [`FsCorpus`] reads the
//! directories named in `[corpus]`; [`MemoryCorpus`] backs tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use draftdesk_core::models::{derive_title, Document};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::extract::docx_pages;
use crate::models::{CompletedReport, CompletedReportContent, Draft, DraftSummary};

#[async_trait]
pub trait Corpus: Send + Sync {
    /// Completed reports in corpus order.
    async fn completed(&self) -> Result<Vec<CompletedReportContent>>;

    async fn completed_document(&self, id: &str) -> Result<Option<CompletedReportContent>>;

    async fn drafts(&self) -> Result<Vec<DraftSummary>>;

    async fn draft(&self, id: &str) -> Result<Option<Draft>>;

    /// Listing view of [`completed`](Corpus::completed).
    async fn completed_list(&self) -> Result<Vec<CompletedReport>> {
        Ok(self
            .completed()
            .await?
            .into_iter()
            .map(|r| CompletedReport {
                id: r.id,
                filename: r.filename,
                title: r.title,
            })
            .collect())
    }

    /// Completed reports as indexable documents. Blank reports are skipped.
    async fn documents(&self) -> Result<Vec<Document>> {
        Ok(self
            .completed()
            .await?
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .map(|r| Document::new(r.id, r.title, r.content))
            .collect())
    }
}

// ============ Filesystem corpus ============

/// Corpus backed by two directories: `*.txt` completed reports and `*.docx`
/// drafts. Missing directories read as empty.
pub struct FsCorpus {
    completed_dir: PathBuf,
    drafts_dir: PathBuf,
    completed_glob: GlobSet,
    drafts_glob: GlobSet,
}

impl FsCorpus {
    pub fn new(config: &CorpusConfig) -> Result<Self> {
        Ok(Self {
            completed_dir: config.completed_dir.clone(),
            drafts_dir: config.drafts_dir.clone(),
            completed_glob: build_globset(&["*.txt"])?,
            drafts_glob: build_globset(&["*.docx"])?,
        })
    }

    fn completed_path(&self, id: &str) -> Option<PathBuf> {
        safe_id(id).then(|| self.completed_dir.join(format!("{}.txt", id)))
    }

    fn draft_path(&self, id: &str) -> Option<PathBuf> {
        safe_id(id).then(|| self.drafts_dir.join(format!("{}.docx", id)))
    }
}

/// Ids are file stems; anything that could escape the directory is unknown.
fn safe_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && id != "." && id != ".."
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Files directly inside `dir` matching `glob`, sorted by file name.
fn list_files(dir: &Path, glob: &GlobSet) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if glob.is_match(entry.file_name()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

async fn read_completed(path: &Path) -> Result<CompletedReportContent> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    let id = file_stem(path);
    let title = derive_title(&content).unwrap_or_else(|| id.clone());
    Ok(CompletedReportContent {
        id,
        filename: file_name(path),
        title,
        content,
    })
}

async fn read_draft(path: &Path) -> Result<Draft> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read draft: {}", path.display()))?;
    let pages =
        docx_pages(&bytes).with_context(|| format!("Failed to parse draft: {}", path.display()))?;
    Ok(Draft {
        id: file_stem(path),
        filename: file_name(path),
        pages,
    })
}

#[async_trait]
impl Corpus for FsCorpus {
    async fn completed(&self) -> Result<Vec<CompletedReportContent>> {
        let mut reports = Vec::new();
        for path in list_files(&self.completed_dir, &self.completed_glob)? {
            match read_completed(&path).await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::warn!(path = %path.display(), "skipping report: {:#}", e),
            }
        }
        Ok(reports)
    }

    async fn completed_document(&self, id: &str) -> Result<Option<CompletedReportContent>> {
        match self.completed_path(id) {
            Some(path) if path.is_file() => Ok(Some(read_completed(&path).await?)),
            _ => Ok(None),
        }
    }

    async fn drafts(&self) -> Result<Vec<DraftSummary>> {
        let mut drafts = Vec::new();
        for path in list_files(&self.drafts_dir, &self.drafts_glob)? {
            match read_draft(&path).await {
                Ok(draft) => drafts.push(draft.summary()),
                Err(e) => tracing::warn!(path = %path.display(), "skipping draft: {:#}", e),
            }
        }
        Ok(drafts)
    }

    async fn draft(&self, id: &str) -> Result<Option<Draft>> {
        match self.draft_path(id) {
            Some(path) if path.is_file() => Ok(Some(read_draft(&path).await?)),
            _ => Ok(None),
        }
    }
}

// ============ In-memory corpus ============

/// Corpus held in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    completed: Vec<CompletedReportContent>,
    drafts: Vec<Draft>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a completed report; its title is derived from the text.
    pub fn with_completed(mut self, id: &str, content: &str) -> Self {
        let title = derive_title(content).unwrap_or_else(|| id.to_string());
        self.completed.push(CompletedReportContent {
            id: id.to_string(),
            filename: format!("{}.txt", id),
            title,
            content: content.to_string(),
        });
        self
    }

    pub fn with_draft(mut self, draft: Draft) -> Self {
        self.drafts.push(draft);
        self
    }
}

#[async_trait]
impl Corpus for MemoryCorpus {
    async fn completed(&self) -> Result<Vec<CompletedReportContent>> {
        Ok(self.completed.clone())
    }

    async fn completed_document(&self, id: &str) -> Result<Option<CompletedReportContent>> {
        Ok(self.completed.iter().find(|r| r.id == id).cloned())
    }

    async fn drafts(&self) -> Result<Vec<DraftSummary>> {
        Ok(self.drafts.iter().map(Draft::summary).collect())
    }

    async fn draft(&self, id: &str) -> Result<Option<Draft>> {
        Ok(self.drafts.iter().find(|d| d.id == id).cloned())
    }
}
