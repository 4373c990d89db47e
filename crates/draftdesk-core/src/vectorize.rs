//! Tokenization and term-frequency vectors.
//!
//! The same [`Tokenizer`] must be used for corpus documents and live
//! queries, otherwise similarity scores are meaningless. Term frequencies
//! are normalized by the total number of tokens so that document length
//! does not bias scores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Deterministic rule for splitting text into terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tokenizer {
    /// Lowercased alphanumeric words; every other character separates terms.
    #[default]
    Words,
    /// Character n-grams taken inside word boundaries.
    ///
    /// Each whitespace-separated word is padded with one space on both
    /// sides before n-grams of length `min..=max` are taken. A padded word
    /// shorter than `n` contributes itself once. Suited to scripts without
    /// spaces between words.
    CharNgrams { min: usize, max: usize },
}

impl Tokenizer {
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        match *self {
            Tokenizer::Words => word_tokens(text),
            Tokenizer::CharNgrams { min, max } => char_wb_ngrams(text, min, max),
        }
    }
}

fn word_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn char_wb_ngrams(text: &str, min: usize, max: usize) -> Vec<String> {
    let min = min.max(1);
    let mut out = Vec::new();
    for word in text.to_lowercase().split_whitespace() {
        let mut padded: Vec<char> = Vec::with_capacity(word.len() + 2);
        padded.push(' ');
        padded.extend(word.chars());
        padded.push(' ');
        let len = padded.len();

        for n in min..=max {
            let mut offset = 0;
            out.push(padded[..n.min(len)].iter().collect());
            while offset + n < len {
                offset += 1;
                out.push(padded[offset..offset + n].iter().collect());
            }
            // The whole padded word was emitted; longer n-grams add nothing.
            if offset == 0 {
                break;
            }
        }
    }
    out
}

/// Sparse term → weight mapping. Zero weights are never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermVector {
    weights: BTreeMap<String, f64>,
}

impl TermVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a term weight; non-positive weights remove the term.
    pub fn set(&mut self, term: impl Into<String>, weight: f64) {
        let term = term.into();
        if weight > 0.0 {
            self.weights.insert(term, weight);
        } else {
            self.weights.remove(&term);
        }
    }

    pub fn get(&self, term: &str) -> f64 {
        self.weights.get(term).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(t, w)| (t.as_str(), *w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_zero(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn norm(&self) -> f64 {
        self.weights.values().map(|w| w * w).sum::<f64>().sqrt()
    }

    pub fn dot(&self, other: &TermVector) -> f64 {
        // Iterate the smaller side and probe the larger one.
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .weights
            .iter()
            .map(|(t, w)| w * large.get(t))
            .sum()
    }
}

impl FromIterator<(String, f64)> for TermVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut v = TermVector::new();
        for (term, weight) in iter {
            v.set(term, weight);
        }
        v
    }
}

/// Raw term counts for `text`.
pub fn term_counts(tokenizer: &Tokenizer, text: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for token in tokenizer.tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

/// Length-normalized term frequencies for `text`.
///
/// Empty text, or text without any tokens, yields the zero vector.
pub fn vectorize(tokenizer: &Tokenizer, text: &str) -> TermVector {
    let counts = term_counts(tokenizer, text);
    let total: usize = counts.values().sum();
    if total == 0 {
        return TermVector::new();
    }
    counts
        .into_iter()
        .map(|(term, count)| (term, count as f64 / total as f64))
        .collect()
}
