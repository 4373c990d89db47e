//! Compose sessions: an editable document with anchored comments.
//!
//! A [`ComposeSession`] owns one [`AnnotationSession`]. Model replies that
//! carry a full rewrite replace the text wholesale, which also drops every
//! comment; failed model calls leave the session untouched.
//!
//! Sessions live in a [`SessionStore`]. Each one sits behind its own async
//! mutex, so requests against the same session run one at a time while
//! different sessions proceed independently.

use anyhow::Result;
use draftdesk_core::annotate::{AnnotationSession, Comment, CommentId, Run, Span};
use draftdesk_core::revision::RevisionChain;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::assistant::{Assistant, ChatMode, ChatRequest, ChatResponse};
use crate::models::ModelReply;

pub struct ComposeSession {
    id: Uuid,
    annotations: AnnotationSession,
    /// Draft this session was seeded from, if any.
    source_draft: Option<String>,
}

impl ComposeSession {
    pub fn new(text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            annotations: AnnotationSession::new(text),
            source_draft: None,
        }
    }

    /// Start from the final revision of a resolved draft.
    pub fn from_chain(draft_id: &str, chain: &RevisionChain) -> Self {
        let mut session = Self::new(chain.seed_text());
        session.source_draft = Some(draft_id.to_string());
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> String {
        self.annotations.text()
    }

    pub fn annotations(&self) -> &AnnotationSession {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut AnnotationSession {
        &mut self.annotations
    }

    pub fn add_comment(&mut self, range: Span, text: &str) -> Result<Comment> {
        Ok(self.annotations.add(range, text)?)
    }

    pub fn remove_comment(&mut self, id: CommentId) -> bool {
        self.annotations.remove(id)
    }

    /// Rewrite the document following all comments.
    pub async fn apply_comments(&mut self, assistant: &Assistant) -> Result<ModelReply> {
        let reply = assistant
            .apply_comments(&self.text(), &self.annotations.batch())
            .await?;
        self.accept(&reply.report_content);
        Ok(reply)
    }

    /// One chat turn about this document; the chat history is keyed by the
    /// session id.
    pub async fn chat(
        &mut self,
        assistant: &Assistant,
        message: &str,
        mode: ChatMode,
    ) -> Result<ChatResponse> {
        let response = assistant
            .chat(ChatRequest {
                session_id: Some(self.id.to_string()),
                message: message.to_string(),
                mode,
                editor_content: self.text(),
            })
            .await?;
        self.accept(&response.report_content);
        Ok(response)
    }

    fn accept(&mut self, report_content: &Option<String>) {
        if let Some(text) = report_content {
            tracing::debug!(session = %self.id, "replacing document with model rewrite");
            self.annotations.replace_text(text);
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id.to_string(),
            source_draft: self.source_draft.clone(),
            text: self.text(),
            runs: self.annotations.buffer().runs().to_vec(),
            comments: self
                .annotations
                .list()
                .iter()
                .map(|c| CommentView {
                    spans: self.annotations.locate(c.id),
                    intact: self.annotations.is_intact(c.id),
                    comment: c.clone(),
                })
                .collect(),
        }
    }
}

/// Serializable snapshot of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub source_draft: Option<String>,
    pub text: String,
    pub runs: Vec<Run>,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    /// Where the comment is highlighted now.
    pub spans: Vec<Span>,
    pub intact: bool,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<ComposeSession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: ComposeSession) -> Arc<Mutex<ComposeSession>> {
        let id = session.id();
        let session = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, session.clone());
        tracing::debug!(session = %id, "created compose session");
        session
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<Mutex<ComposeSession>>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
