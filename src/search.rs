//! Related-report search over the completed corpus.
//!
//! Wraps the core TF-IDF index with the pieces an application needs: a
//! cache that rebuilds the index only when the corpus changes, title and
//! snippet lookup, and the wire shape served by the CLI and HTTP API.
//!
//! # Pipeline
//!
//! 1. Blank query → empty result, the corpus is not touched.
//! 2. Load indexable documents; an empty corpus → empty result.
//! 3. Reuse the cached index unless the corpus version changed.
//! 4. Rank with cosine similarity, drop hits below `min_score`.
//! 5. Round scores to four decimals and attach title and snippet.

use anyhow::Result;
use draftdesk_core::index::{corpus_version, CorpusIndex, IndexOptions};
use draftdesk_core::models::Document;
use draftdesk_core::search::{search_with, SearchOptions};
use draftdesk_core::CoreError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{Config, RetrievalConfig};
use crate::corpus::{Corpus, FsCorpus};
use crate::models::RelatedReport;

/// Retrieval parameters, decoupled from the TOML layout.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub index: IndexOptions,
    pub top_k: usize,
    pub min_score: f64,
    pub snippet_chars: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for SearchSettings {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            index: IndexOptions {
                tokenizer: config.tokenizer(),
                max_features: config.max_features,
            },
            top_k: config.top_k,
            min_score: config.min_score,
            snippet_chars: config.snippet_chars,
        }
    }
}

/// Holds the most recent index snapshot, swapped whole on rebuild.
#[derive(Default)]
pub struct IndexCache {
    current: RwLock<Option<Arc<CorpusIndex>>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index for `documents`, rebuilt only if the cached one is stale.
    pub async fn get(
        &self,
        documents: &[Document],
        options: &IndexOptions,
    ) -> std::result::Result<Arc<CorpusIndex>, CoreError> {
        let version = corpus_version(documents);
        if let Some(index) = self.current.read().await.as_ref() {
            if !index.is_stale(&version) {
                return Ok(index.clone());
            }
        }

        let mut current = self.current.write().await;
        // Another writer may have rebuilt while we waited.
        if let Some(index) = current.as_ref() {
            if !index.is_stale(&version) {
                return Ok(index.clone());
            }
        }
        match CorpusIndex::build(documents, options) {
            Ok(index) => {
                tracing::info!(
                    documents = index.len(),
                    terms = index.vocabulary_len(),
                    "rebuilt corpus index"
                );
                let index = Arc::new(index);
                *current = Some(index.clone());
                Ok(index)
            }
            Err(e) => {
                *current = None;
                Err(e)
            }
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.current.read().await.is_none()
    }
}

/// Search entry point shared by the server, live search, and CLI.
pub struct SearchService {
    corpus: Arc<dyn Corpus>,
    cache: IndexCache,
    settings: SearchSettings,
}

impl SearchService {
    pub fn new(corpus: Arc<dyn Corpus>, settings: SearchSettings) -> Self {
        Self {
            corpus,
            cache: IndexCache::new(),
            settings,
        }
    }

    pub fn corpus(&self) -> &Arc<dyn Corpus> {
        &self.corpus
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Completed reports related to `query`, best first.
    pub async fn related(&self, query: &str, top_k: usize) -> Result<Vec<RelatedReport>> {
        search_related(
            self.corpus.as_ref(),
            &self.cache,
            &self.settings,
            query,
            top_k,
        )
        .await
    }

    /// Full texts of up to `limit` reference reports for `context`.
    ///
    /// Falls back to corpus order when nothing scores above zero.
    pub async fn reference_texts(&self, context: &str, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let documents = self.corpus.documents().await?;
        let related: Vec<String> = self
            .related(context, limit)
            .await?
            .into_iter()
            .filter(|r| r.score > 0.0)
            .map(|r| r.document_id)
            .collect();

        let texts = if related.is_empty() {
            documents
                .into_iter()
                .take(limit)
                .map(|d| d.raw_text)
                .collect()
        } else {
            let mut by_id: HashMap<String, String> = documents
                .into_iter()
                .map(|d| (d.id, d.raw_text))
                .collect();
            related
                .iter()
                .filter_map(|id| by_id.remove(id))
                .collect()
        };
        Ok(texts)
    }
}

/// Rank completed reports against `query`.
pub async fn search_related(
    corpus: &dyn Corpus,
    cache: &IndexCache,
    settings: &SearchSettings,
    query: &str,
    top_k: usize,
) -> Result<Vec<RelatedReport>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let documents = corpus.documents().await?;
    let index = match cache.get(&documents, &settings.index).await {
        Ok(index) => index,
        Err(CoreError::IndexUnavailable) => {
            tracing::debug!("corpus is empty, no related reports");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let query_vector = index.embed_query(query);
    let hits = search_with(
        &index,
        &query_vector,
        SearchOptions {
            k: top_k,
            min_score: settings.min_score,
        },
    );

    let by_id: HashMap<&str, &Document> = documents.iter().map(|d| (d.id.as_str(), d)).collect();
    Ok(hits
        .into_iter()
        .filter_map(|hit| {
            let doc = by_id.get(hit.document_id.as_str())?;
            Some(RelatedReport {
                title: doc.title.clone(),
                score: round4(hit.score),
                snippet: snippet(&doc.raw_text, settings.snippet_chars),
                document_id: hit.document_id,
            })
        })
        .collect())
}

fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// First `max_chars` characters of `text`, with `...` when truncated.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// `draftdesk search`: print related reports for `query`.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let corpus = FsCorpus::new(&config.corpus)?;
    let settings = SearchSettings::from(&config.retrieval);
    let top_k = limit.unwrap_or(settings.top_k);
    let results = search_related(&corpus, &IndexCache::new(), &settings, query, top_k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, result.score, result.title);
        println!("    id: {}", result.document_id);
        println!(
            "    excerpt: \"{}\"",
            result.snippet.replace('\n', " ").trim()
        );
        println!();
    }
    Ok(())
}
