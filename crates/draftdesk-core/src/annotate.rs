//! Range-anchored annotations over an editable run buffer.
//!
//! A [`DocumentBuffer`] is an ordered arena of [`Run`]s. Each run carries a
//! set of comment ids; the concatenation of run texts is the document. The
//! runs are the source of truth for where a comment lives: the span cached
//! on a [`Comment`] at creation is informational only, and every lookup
//! ([`DocumentBuffer::spans_of`], [`DocumentBuffer::untag`]) scans the runs.
//!
//! # Edit semantics
//!
//! - Inserting strictly inside a run extends that run's tags.
//! - Inserting at a run boundary keeps only the tags present on both sides,
//!   so text typed next to a highlight is not retroactively annotated.
//! - [`DocumentBuffer::insert_plain`] inserts untagged text even inside a
//!   run, splitting a highlight into disjoint pieces.
//! - Deleting shrinks runs; a run deleted entirely simply disappears, the
//!   comment record itself is untouched.
//!
//! Offsets and lengths count Unicode scalar values, not bytes. Adjacent runs
//! with identical tags are merged after every mutation.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub type CommentId = u64;

/// A character range: `start` and `length` in Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub length: usize,
}

impl Span {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    /// One past the last position, saturating at `usize::MAX`.
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.length)
    }
}

/// A contiguous piece of text sharing one set of comment tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Run {
    text: String,
    len: usize,
    tags: Vec<CommentId>,
}

impl Run {
    fn new(text: &str, tags: Vec<CommentId>) -> Self {
        Self {
            text: text.to_string(),
            len: text.chars().count(),
            tags,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Comment ids covering this run, ascending.
    pub fn tags(&self) -> &[CommentId] {
        &self.tags
    }

    pub fn is_tagged(&self, id: CommentId) -> bool {
        self.tags.binary_search(&id).is_ok()
    }

    fn split_off(&mut self, at: usize) -> Run {
        let cut = byte_offset(&self.text, at);
        let right = self.text.split_off(cut);
        let right_len = self.len - at;
        self.len = at;
        Run {
            text: right,
            len: right_len,
            tags: self.tags.clone(),
        }
    }
}

fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentBuffer {
    runs: Vec<Run>,
}

impl DocumentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        let mut buffer = Self::new();
        buffer.replace_text(text);
        buffer
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.runs.iter().map(|r| r.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Text covered by `span`.
    pub fn slice(&self, span: Span) -> Result<String> {
        self.check(span)?;
        Ok(self
            .text()
            .chars()
            .skip(span.start)
            .take(span.length)
            .collect())
    }

    /// Replace the whole text with a single untagged run.
    pub fn replace_text(&mut self, text: &str) {
        self.runs.clear();
        if !text.is_empty() {
            self.runs.push(Run::new(text, Vec::new()));
        }
    }

    /// Insert `text` at `pos`, following the tag rules in the module docs.
    pub fn insert(&mut self, pos: usize, text: &str) -> Result<()> {
        self.insert_inner(pos, text, false)
    }

    /// Insert `text` at `pos` without any tags, splitting a run if needed.
    pub fn insert_plain(&mut self, pos: usize, text: &str) -> Result<()> {
        self.insert_inner(pos, text, true)
    }

    fn insert_inner(&mut self, pos: usize, text: &str, plain: bool) -> Result<()> {
        self.check(Span::new(pos, 0))?;
        if text.is_empty() {
            return Ok(());
        }

        let mut offset = 0;
        let mut before: Option<usize> = None;
        let mut after: Option<usize> = None;
        for i in 0..self.runs.len() {
            let end = offset + self.runs[i].len;
            if offset < pos && pos < end {
                if plain {
                    break;
                }
                let run = &mut self.runs[i];
                let at = byte_offset(&run.text, pos - offset);
                run.text.insert_str(at, text);
                run.len += text.chars().count();
                return Ok(());
            }
            if end == pos {
                before = Some(i);
            }
            if offset == pos {
                after = Some(i);
                break;
            }
            offset = end;
        }

        let index = if plain {
            self.split_at(pos)
        } else {
            before.map(|i| i + 1).unwrap_or(0)
        };
        let tags = match (before, after) {
            (Some(b), Some(a)) if !plain => self.runs[b]
                .tags
                .iter()
                .copied()
                .filter(|t| self.runs[a].is_tagged(*t))
                .collect(),
            _ => Vec::new(),
        };
        self.runs.insert(index, Run::new(text, tags));
        self.normalize();
        Ok(())
    }

    /// Delete the text covered by `span`.
    pub fn delete(&mut self, span: Span) -> Result<()> {
        self.check(span)?;
        if span.length == 0 {
            return Ok(());
        }
        let from = self.split_at(span.start);
        let to = self.split_at(span.end());
        self.runs.drain(from..to);
        self.normalize();
        Ok(())
    }

    /// Tag every position in `span` with `id`, splitting runs at the edges.
    pub fn tag(&mut self, span: Span, id: CommentId) -> Result<()> {
        self.check(span)?;
        let from = self.split_at(span.start);
        let to = self.split_at(span.end());
        for run in &mut self.runs[from..to] {
            if let Err(pos) = run.tags.binary_search(&id) {
                run.tags.insert(pos, id);
            }
        }
        self.normalize();
        Ok(())
    }

    /// Remove `id` from every run currently carrying it.
    ///
    /// Returns how many runs were un-tagged.
    pub fn untag(&mut self, id: CommentId) -> usize {
        let mut count = 0;
        for run in &mut self.runs {
            if let Ok(pos) = run.tags.binary_search(&id) {
                run.tags.remove(pos);
                count += 1;
            }
        }
        self.normalize();
        count
    }

    pub fn untag_all(&mut self) {
        for run in &mut self.runs {
            run.tags.clear();
        }
        self.normalize();
    }

    /// Indices of runs currently tagged with `id`.
    pub fn find_tagged(&self, id: CommentId) -> Vec<usize> {
        self.runs
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_tagged(id))
            .map(|(i, _)| i)
            .collect()
    }

    /// Live spans of `id`, with touching runs coalesced.
    pub fn spans_of(&self, id: CommentId) -> Vec<Span> {
        let mut spans: Vec<Span> = Vec::new();
        let mut offset = 0;
        for run in &self.runs {
            if run.is_tagged(id) {
                match spans.last_mut() {
                    Some(last) if last.end() == offset => last.length += run.len,
                    _ => spans.push(Span::new(offset, run.len)),
                }
            }
            offset += run.len;
        }
        spans
    }

    fn check(&self, span: Span) -> Result<()> {
        let len = self.len();
        let in_bounds = span.start.checked_add(span.length).is_some_and(|end| end <= len);
        if !in_bounds {
            return Err(CoreError::RangeOutOfBounds {
                start: span.start,
                length: span.length,
                len,
            });
        }
        Ok(())
    }

    /// Ensure a run boundary at `pos`; returns the index of the run that
    /// starts there (or `runs.len()` at the end of the document).
    fn split_at(&mut self, pos: usize) -> usize {
        let mut offset = 0;
        for i in 0..self.runs.len() {
            if pos == offset {
                return i;
            }
            let len = self.runs[i].len;
            if pos < offset + len {
                let right = self.runs[i].split_off(pos - offset);
                self.runs.insert(i + 1, right);
                return i + 1;
            }
            offset += len;
        }
        self.runs.len()
    }

    fn normalize(&mut self) {
        let mut merged: Vec<Run> = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            if run.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(last) if last.tags == run.tags => {
                    last.text.push_str(&run.text);
                    last.len += run.len;
                }
                _ => merged.push(run),
            }
        }
        self.runs = merged;
    }
}

/// Reviewer feedback anchored to a span of the session's document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: CommentId,
    /// The exact text selected when the comment was created.
    pub anchor_text: String,
    pub text: String,
    /// Span at creation time; may be out of date after edits.
    pub span: Span,
}

/// `{text, selected_text}` pair handed to the comment-apply collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentInstruction {
    pub text: String,
    pub selected_text: String,
}

/// Per-document annotation state: the buffer, its comments, and the id
/// counter. Dropped together with the editing session.
#[derive(Debug, Clone)]
pub struct AnnotationSession {
    buffer: DocumentBuffer,
    comments: Vec<Comment>,
    next_id: CommentId,
}

impl Default for AnnotationSession {
    fn default() -> Self {
        Self::new("")
    }
}

impl AnnotationSession {
    pub fn new(text: &str) -> Self {
        Self {
            buffer: DocumentBuffer::from_text(text),
            comments: Vec::new(),
            next_id: 1,
        }
    }

    pub fn buffer(&self) -> &DocumentBuffer {
        &self.buffer
    }

    pub fn text(&self) -> String {
        self.buffer.text()
    }

    /// Anchor a new comment to `range`.
    pub fn add(&mut self, range: Span, text: impl Into<String>) -> Result<Comment> {
        if range.length == 0 {
            return Err(CoreError::NoSelection);
        }
        let anchor_text = self.buffer.slice(range)?;
        let id = self.next_id;
        self.buffer.tag(range, id)?;
        self.next_id += 1;

        let comment = Comment {
            id,
            anchor_text,
            text: text.into(),
            span: range,
        };
        self.comments.push(comment.clone());
        Ok(comment)
    }

    /// Remove a comment and its highlighting. Unknown ids are a no-op.
    ///
    /// Returns whether a comment record was removed.
    pub fn remove(&mut self, id: CommentId) -> bool {
        let runs = self.buffer.untag(id);
        let before = self.comments.len();
        self.comments.retain(|c| c.id != id);
        let removed = self.comments.len() != before;
        if removed {
            tracing::debug!(comment = id, runs, "removed comment");
        }
        removed
    }

    pub fn clear_all(&mut self) {
        self.buffer.untag_all();
        self.comments.clear();
    }

    /// Comments in creation order.
    pub fn list(&self) -> &[Comment] {
        &self.comments
    }

    pub fn get(&self, id: CommentId) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == id)
    }

    /// Where the comment is highlighted right now.
    pub fn locate(&self, id: CommentId) -> Vec<Span> {
        self.buffer.spans_of(id)
    }

    /// Whether the comment still covers exactly its original text in one
    /// piece.
    pub fn is_intact(&self, id: CommentId) -> bool {
        let Some(comment) = self.get(id) else {
            return false;
        };
        match self.locate(id).as_slice() {
            [span] => self
                .buffer
                .slice(*span)
                .map(|live| live == comment.anchor_text)
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn insert(&mut self, pos: usize, text: &str) -> Result<()> {
        self.buffer.insert(pos, text)
    }

    pub fn insert_plain(&mut self, pos: usize, text: &str) -> Result<()> {
        self.buffer.insert_plain(pos, text)
    }

    pub fn delete(&mut self, span: Span) -> Result<()> {
        self.buffer.delete(span)
    }

    /// Replace the whole document. Every comment is dropped, since anchors
    /// cannot be trusted against unrelated text.
    pub fn replace_text(&mut self, text: &str) {
        self.clear_all();
        self.buffer.replace_text(text);
    }

    /// Comments as instructions for a batch rewrite, in creation order.
    pub fn batch(&self) -> Vec<CommentInstruction> {
        self.comments
            .iter()
            .map(|c| CommentInstruction {
                text: c.text.clone(),
                selected_text: c.anchor_text.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "the quick brown fox";

    fn tags_at(buffer: &DocumentBuffer) -> Vec<Vec<CommentId>> {
        buffer
            .runs()
            .iter()
            .flat_map(|r| std::iter::repeat(r.tags().to_vec()).take(r.len()))
            .collect()
    }

    #[test]
    fn test_add_rejects_empty_selection() {
        let mut s = AnnotationSession::new(TEXT);
        assert_eq!(s.add(Span::new(3, 0), "x"), Err(CoreError::NoSelection));
        assert!(s.list().is_empty());
    }

    #[test]
    fn test_add_rejects_out_of_bounds() {
        let mut s = AnnotationSession::new(TEXT);
        let err = s.add(Span::new(15, 10), "x").unwrap_err();
        assert!(matches!(err, CoreError::RangeOutOfBounds { .. }));
    }

    #[test]
    fn test_overflowing_spans_are_out_of_bounds() {
        let mut s = AnnotationSession::new(TEXT);
        s.add(Span::new(4, 5), "x").unwrap();
        let before = s.buffer().clone();

        let err = s.add(Span::new(usize::MAX, 2), "wraps").unwrap_err();
        assert!(matches!(err, CoreError::RangeOutOfBounds { .. }));
        let err = s.add(Span::new(1, usize::MAX), "wraps").unwrap_err();
        assert!(matches!(err, CoreError::RangeOutOfBounds { .. }));
        let err = s.delete(Span::new(usize::MAX, 1)).unwrap_err();
        assert!(matches!(err, CoreError::RangeOutOfBounds { .. }));
        let err = s.insert(usize::MAX, "x").unwrap_err();
        assert!(matches!(err, CoreError::RangeOutOfBounds { .. }));
        let err = s.insert_plain(usize::MAX, "x").unwrap_err();
        assert!(matches!(err, CoreError::RangeOutOfBounds { .. }));
        assert!(s.buffer().slice(Span::new(usize::MAX, 1)).is_err());

        assert_eq!(s.list().len(), 1);
        assert_eq!(s.buffer(), &before);
        assert_eq!(Span::new(usize::MAX, 2).end(), usize::MAX);
    }

    #[test]
    fn test_add_tags_range_and_captures_anchor() {
        let mut s = AnnotationSession::new(TEXT);
        let c = s.add(Span::new(4, 5), "too informal").unwrap();
        assert_eq!(c.anchor_text, "quick");
        assert_eq!(c.id, 1);
        assert_eq!(s.locate(c.id), vec![Span::new(4, 5)]);
        assert_eq!(s.buffer().runs().len(), 3);
        assert_eq!(s.text(), TEXT);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut s = AnnotationSession::new(TEXT);
        let a = s.add(Span::new(0, 3), "a").unwrap();
        s.remove(a.id);
        let b = s.add(Span::new(0, 3), "b").unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn test_add_then_remove_restores_tag_state() {
        let mut s = AnnotationSession::new(TEXT);
        s.add(Span::new(0, 9), "outer").unwrap();
        let before = s.buffer().clone();

        let c = s.add(Span::new(4, 11), "overlapping").unwrap();
        assert_ne!(s.buffer(), &before);
        s.remove(c.id);

        assert_eq!(s.buffer(), &before);
        assert_eq!(tags_at(s.buffer()), tags_at(&before));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut s = AnnotationSession::new(TEXT);
        s.add(Span::new(4, 5), "x").unwrap();
        let before = s.buffer().clone();
        assert!(!s.remove(42));
        assert_eq!(s.buffer(), &before);
        assert_eq!(s.list().len(), 1);
    }

    #[test]
    fn test_edits_outside_span_keep_anchor() {
        let mut s = AnnotationSession::new(TEXT);
        let c = s.add(Span::new(10, 5), "color?").unwrap();
        assert_eq!(c.anchor_text, "brown");

        s.insert(0, "well, ").unwrap();
        s.delete(Span::new(22, 3)).unwrap(); // "fox"
        s.insert(s.buffer().len(), "dog").unwrap();

        assert_eq!(s.text(), "well, the quick brown dog");
        assert_eq!(s.locate(c.id), vec![Span::new(16, 5)]);
        assert!(s.is_intact(c.id));
        assert_eq!(s.get(c.id).unwrap().anchor_text, "brown");

        let tagged = s.buffer().find_tagged(c.id);
        assert_eq!(tagged.len(), 1);
        s.remove(c.id);
        assert!(s.buffer().runs().iter().all(|r| r.tags().is_empty()));
    }

    #[test]
    fn test_insert_inside_run_extends_tag() {
        let mut s = AnnotationSession::new(TEXT);
        let c = s.add(Span::new(4, 5), "x").unwrap();
        s.insert(6, "ii").unwrap();
        assert_eq!(s.text(), "the quiiick brown fox");
        assert_eq!(s.locate(c.id), vec![Span::new(4, 7)]);
        assert!(!s.is_intact(c.id));
    }

    #[test]
    fn test_insert_at_boundary_does_not_extend_tag() {
        let mut s = AnnotationSession::new(TEXT);
        let c = s.add(Span::new(4, 5), "x").unwrap();
        s.insert(9, "!!").unwrap();
        s.insert(4, ">>").unwrap();
        assert_eq!(s.text(), "the >>quick!! brown fox");
        assert_eq!(s.locate(c.id), vec![Span::new(6, 5)]);
        assert!(s.is_intact(c.id));
    }

    #[test]
    fn test_insert_between_nested_tags_keeps_shared_tag() {
        let mut s = AnnotationSession::new(TEXT);
        let outer = s.add(Span::new(0, 9), "outer").unwrap();
        let inner = s.add(Span::new(4, 5), "inner").unwrap();
        // Boundary between "the " {outer} and "quick" {outer, inner}.
        s.insert(4, "very ").unwrap();
        assert_eq!(s.locate(outer.id), vec![Span::new(0, 14)]);
        assert_eq!(s.locate(inner.id), vec![Span::new(9, 5)]);
    }

    #[test]
    fn test_delete_overlap_shrinks_span() {
        let mut s = AnnotationSession::new(TEXT);
        let c = s.add(Span::new(4, 5), "x").unwrap();
        s.delete(Span::new(2, 4)).unwrap(); // "e qu"
        assert_eq!(s.text(), "thick brown fox");
        assert_eq!(s.locate(c.id), vec![Span::new(2, 3)]);
    }

    #[test]
    fn test_delete_whole_span_keeps_comment_record() {
        let mut s = AnnotationSession::new(TEXT);
        let c = s.add(Span::new(4, 6), "x").unwrap();
        s.delete(Span::new(4, 6)).unwrap();
        assert!(s.locate(c.id).is_empty());
        assert_eq!(s.list().len(), 1);
        assert!(!s.is_intact(c.id));
        assert!(s.remove(c.id));
    }

    #[test]
    fn test_plain_insert_splits_anchor_and_remove_finds_all_pieces() {
        let mut s = AnnotationSession::new(TEXT);
        let c = s.add(Span::new(4, 11), "x").unwrap(); // "quick brown"
        s.insert_plain(9, "\n").unwrap();
        assert_eq!(s.text(), "the quick\n brown fox");
        assert_eq!(s.locate(c.id), vec![Span::new(4, 5), Span::new(10, 6)]);
        assert_eq!(s.buffer().find_tagged(c.id).len(), 2);

        s.remove(c.id);
        assert!(s.locate(c.id).is_empty());
        assert_eq!(s.buffer().runs().len(), 1);
    }

    #[test]
    fn test_clear_all_untags_everything() {
        let mut s = AnnotationSession::new(TEXT);
        s.add(Span::new(0, 3), "a").unwrap();
        s.add(Span::new(4, 5), "b").unwrap();
        s.clear_all();
        assert!(s.list().is_empty());
        assert_eq!(s.buffer().runs().len(), 1);
        assert_eq!(s.text(), TEXT);
    }

    #[test]
    fn test_replace_text_drops_comments() {
        let mut s = AnnotationSession::new(TEXT);
        s.add(Span::new(0, 3), "a").unwrap();
        s.replace_text("brand new text");
        assert!(s.list().is_empty());
        assert_eq!(s.text(), "brand new text");
    }

    #[test]
    fn test_list_reflects_removals_in_creation_order() {
        let mut s = AnnotationSession::new(TEXT);
        let a = s.add(Span::new(0, 3), "a").unwrap();
        let b = s.add(Span::new(4, 5), "b").unwrap();
        let c = s.add(Span::new(10, 5), "c").unwrap();
        s.remove(b.id);
        let ids: Vec<CommentId> = s.list().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    #[test]
    fn test_multibyte_offsets() {
        let mut s = AnnotationSession::new("今週は設計を進めた");
        let c = s.add(Span::new(3, 2), "具体的に").unwrap();
        assert_eq!(c.anchor_text, "設計");
        s.insert(0, "【報告】").unwrap();
        assert_eq!(s.locate(c.id), vec![Span::new(7, 2)]);
        assert!(s.is_intact(c.id));
    }

    #[test]
    fn test_batch_lists_instructions() {
        let mut s = AnnotationSession::new(TEXT);
        s.add(Span::new(16, 3), "use a different animal").unwrap();
        assert_eq!(
            s.batch(),
            vec![CommentInstruction {
                text: "use a different animal".to_string(),
                selected_text: "fox".to_string(),
            }]
        );
    }
}
