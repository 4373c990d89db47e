//! # Draft Desk
//!
//! A writing assistant for recurring reports. Authors draft in an editor,
//! see past reports related to what they are typing, pin comments to
//! passages, and ask a language model to revise the text following those
//! comments or to coach them using reviewer feedback from earlier drafts.
//!
//! The text-processing engines (vectorizer, corpus index, similarity search,
//! debouncer, annotation tracker, revision resolver) live in the
//! `draftdesk-core` crate. This crate adds file-backed corpora, the index
//! cache, the language-model client, compose sessions, and the HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │   Corpus     │──▶│  Index cache  │──▶│   Search     │
//! │ .txt / .docx │   │  (TF-IDF)     │   │   service    │
//! └──────────────┘   └───────────────┘   └──────┬───────┘
//!                                               │
//!        ┌──────────────────┬───────────────────┤
//!        ▼                  ▼                   ▼
//!  ┌───────────┐     ┌─────────────┐     ┌────────────┐
//!  │ Live      │     │ Assistant   │────▶│ Language   │
//!  │ search    │     │ + sessions  │     │ model      │
//!  └───────────┘     └──────┬──────┘     └────────────┘
//!                           ▼
//!                    ┌─────────────┐
//!                    │  HTTP API   │
//!                    └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Wire-level data types |
//! | [`extract`] | `.docx` draft parsing (pages and reviewer comments) |
//! | [`corpus`] | Completed reports and drafts on disk or in memory |
//! | [`search`] | Index cache and related-report search |
//! | [`live`] | Debounced search while typing |
//! | [`llm`] | Language-model client and prompt construction |
//! | [`assistant`] | Chat and comment-apply orchestration |
//! | [`session`] | Compose sessions with anchored comments |
//! | [`reports`] | Corpus listing commands |
//! | [`server`] | HTTP API |

pub mod assistant;
pub mod config;
pub mod corpus;
pub mod extract;
pub mod live;
pub mod llm;
pub mod models;
pub mod reports;
pub mod search;
pub mod server;
pub mod session;
