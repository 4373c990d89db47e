//! # Draft Desk Core
//!
//! Pure logic for Draft Desk: data models, TF-IDF vectorization, the corpus
//! index, similarity search, the live-query debouncer, the annotation range
//! tracker, and the revision chain resolver.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. Time is passed in
//! explicitly (see [`debounce`]) so every state machine here can be driven
//! deterministically from tests or from any async runtime.

pub mod annotate;
pub mod debounce;
pub mod error;
pub mod index;
pub mod models;
pub mod revision;
pub mod search;
pub mod vectorize;

pub use error::CoreError;
