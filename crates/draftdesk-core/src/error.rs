//! Error taxonomy for core operations.
//!
//! Every variant is scoped to the operation that produced it; none of them
//! is fatal to the process. Stale search responses are not represented here
//! at all: [`Debouncer::on_response`](crate::debounce::Debouncer::on_response)
//! simply returns `None` for them.

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A comment was requested for an empty selection.
    #[error("no text selected")]
    NoSelection,

    /// A range reaches past the end of the document.
    #[error("range {start}+{length} is outside the document (length {len})")]
    RangeOutOfBounds {
        start: usize,
        length: usize,
        len: usize,
    },

    /// The corpus has no indexable documents.
    #[error("corpus index unavailable: no documents to index")]
    IndexUnavailable,

    /// The stored pages of a draft do not form a valid chain.
    #[error("malformed revision chain: {0}")]
    MalformedRevisionChain(String),
}
