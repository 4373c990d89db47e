//! TF-IDF corpus index.
//!
//! The index holds one [`TermVector`] per corpus document plus the global
//! inverse-document-frequency table they were weighted with. It is always
//! rebuilt as a whole: when the corpus changes, the old snapshot is stale
//! and replaced atomically by a fresh [`CorpusIndex::build`].
//!
//! # Weighting
//!
//! ```text
//! tf(t, d)  = count(t, d) / tokens(d)
//! idf(t)    = ln((1 + N) / (1 + df(t))) + 1
//! w(t, d)   = tf(t, d) * idf(t)
//! ```
//!
//! Terms that appear in more documents get a lower weight; every corpus
//! term keeps a strictly positive weight.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CoreError, Result};
use crate::models::Document;
use crate::vectorize::{term_counts, vectorize, TermVector, Tokenizer};

/// Index construction parameters.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub tokenizer: Tokenizer,
    /// Keep only this many terms, ranked by total count across the corpus.
    pub max_features: Option<usize>,
}

/// One indexed document, in corpus insertion order.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub document_id: String,
    pub vector: TermVector,
}

#[derive(Debug, Clone)]
pub struct CorpusIndex {
    tokenizer: Tokenizer,
    entries: Vec<IndexEntry>,
    idf: BTreeMap<String, f64>,
    version: String,
}

impl CorpusIndex {
    /// Build a snapshot over the whole corpus.
    ///
    /// Fails with [`CoreError::IndexUnavailable`] when `documents` is empty.
    pub fn build(documents: &[Document], options: &IndexOptions) -> Result<Self> {
        if documents.is_empty() {
            return Err(CoreError::IndexUnavailable);
        }

        let tokenizer = options.tokenizer;
        let counts: Vec<BTreeMap<String, usize>> = documents
            .iter()
            .map(|d| term_counts(&tokenizer, &d.raw_text))
            .collect();

        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        let mut corpus_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for doc_counts in &counts {
            for (term, count) in doc_counts {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
                *corpus_freq.entry(term.as_str()).or_insert(0) += count;
            }
        }

        let vocabulary = select_vocabulary(&corpus_freq, options.max_features);

        let n = documents.len() as f64;
        let idf: BTreeMap<String, f64> = doc_freq
            .iter()
            .filter(|(term, _)| vocabulary.contains(*term))
            .map(|(term, df)| {
                let weight = ((1.0 + n) / (1.0 + *df as f64)).ln() + 1.0;
                (term.to_string(), weight)
            })
            .collect();

        let entries = documents
            .iter()
            .zip(counts.iter())
            .map(|(doc, doc_counts)| {
                let total: usize = doc_counts.values().sum();
                let vector = doc_counts
                    .iter()
                    .filter_map(|(term, count)| {
                        let idf = idf.get(term)?;
                        let tf = *count as f64 / total as f64;
                        Some((term.clone(), tf * idf))
                    })
                    .collect();
                IndexEntry {
                    document_id: doc.id.clone(),
                    vector,
                }
            })
            .collect();

        tracing::debug!(
            documents = documents.len(),
            terms = idf.len(),
            "built corpus index"
        );

        Ok(Self {
            tokenizer,
            entries,
            idf,
            version: corpus_version(documents),
        })
    }

    /// Whether the corpus has changed since this snapshot was built.
    pub fn is_stale(&self, current_version: &str) -> bool {
        self.version != current_version
    }

    /// Embed query text against this snapshot's vocabulary and IDF table.
    ///
    /// Terms outside the vocabulary contribute nothing.
    pub fn embed_query(&self, text: &str) -> TermVector {
        vectorize(&self.tokenizer, text)
            .iter()
            .filter_map(|(term, tf)| self.idf.get(term).map(|idf| (term.to_string(), tf * idf)))
            .collect()
    }

    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn vector(&self, document_id: &str) -> Option<&TermVector> {
        self.entries
            .iter()
            .find(|e| e.document_id == document_id)
            .map(|e| &e.vector)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn tokenizer(&self) -> Tokenizer {
        self.tokenizer
    }

    pub fn vocabulary_len(&self) -> usize {
        self.idf.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn select_vocabulary<'a>(
    corpus_freq: &BTreeMap<&'a str, usize>,
    max_features: Option<usize>,
) -> BTreeSet<&'a str> {
    match max_features {
        Some(limit) if limit < corpus_freq.len() => {
            let mut ranked: Vec<(&str, usize)> =
                corpus_freq.iter().map(|(t, c)| (*t, *c)).collect();
            // Highest count first, then term order for determinism.
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            ranked.into_iter().take(limit).map(|(t, _)| t).collect()
        }
        _ => corpus_freq.keys().copied().collect(),
    }
}

/// Fingerprint of a corpus: SHA-256 over document ids and texts, in order.
pub fn corpus_version(documents: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for doc in documents {
        hasher.update(doc.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.raw_text.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
