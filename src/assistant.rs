//! Chat and comment-apply requests against the language model.
//!
//! The [`Assistant`] gathers what a prompt needs (reference reports from
//! search, past reviewer comments for education mode, the session's chat
//! history), calls the model, and records the turn. It never touches an
//! editing session itself; see [`crate::session`] for that.

use anyhow::Result;
use draftdesk_core::annotate::CommentInstruction;
use draftdesk_core::models::PageComment;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::llm::{
    ask, chat_messages, ChatHistory, LanguageModel, Prompts, APPLY_REFERENCES, COMPOSE_REFERENCES,
    EDUCATION_DRAFTS, EDUCATION_REFERENCES,
};
use crate::models::ModelReply;
use crate::search::SearchService;

/// Rejected input, reported to clients as `400 bad_request`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("document is empty")]
    EmptyDocument,
    #[error("there are no comments to apply")]
    NoComments,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Write or revise the report.
    #[default]
    Compose,
    /// Teach: feedback informed by past reviewer comments.
    Education,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub mode: ChatMode,
    #[serde(default)]
    pub editor_content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub chat_message: String,
    pub report_content: Option<String>,
}

pub struct Assistant {
    search: Arc<SearchService>,
    model: Arc<dyn LanguageModel>,
    prompts: Prompts,
    history: ChatHistory,
}

impl Assistant {
    pub fn new(
        search: Arc<SearchService>,
        model: Arc<dyn LanguageModel>,
        prompts: Prompts,
        history_turns: usize,
    ) -> Self {
        Self {
            search,
            model,
            prompts,
            history: ChatHistory::new(history_turns),
        }
    }

    /// One chat turn. A missing session id starts a new conversation.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        if request.message.trim().is_empty() {
            return Err(RequestError::EmptyMessage.into());
        }
        let session_id = request
            .session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let context = format!("{}\n{}", request.editor_content, request.message);
        let system = match request.mode {
            ChatMode::Compose => {
                let references = self.search.reference_texts(&context, COMPOSE_REFERENCES).await?;
                self.prompts.compose_system(&references)
            }
            ChatMode::Education => {
                let feedback = self.reviewer_feedback().await?;
                let references = self
                    .search
                    .reference_texts(&context, EDUCATION_REFERENCES)
                    .await?;
                self.prompts.education_system(&feedback, &references)
            }
        };

        let history = self.history.recent(&session_id).await;
        let messages = chat_messages(system, &history, &request.editor_content, &request.message);
        let reply = ask(self.model.as_ref(), &messages).await?;

        self.history
            .record(&session_id, &request.message, &reply.chat_message)
            .await;

        Ok(ChatResponse {
            session_id,
            chat_message: reply.chat_message,
            report_content: reply.report_content,
        })
    }

    /// Ask the model to rewrite `document` following every comment.
    pub async fn apply_comments(
        &self,
        document: &str,
        comments: &[CommentInstruction],
    ) -> Result<ModelReply> {
        if document.trim().is_empty() {
            return Err(RequestError::EmptyDocument.into());
        }
        if comments.is_empty() {
            return Err(RequestError::NoComments.into());
        }

        let references = self.search.reference_texts(document, APPLY_REFERENCES).await?;
        let messages = self
            .prompts
            .apply_comments_messages(document, comments, &references);
        Ok(ask(self.model.as_ref(), &messages).await?)
    }

    pub async fn clear_history(&self, session_id: &str) {
        self.history.clear(session_id).await;
    }

    /// Reviewer comments from the first few drafts, oldest revision first.
    async fn reviewer_feedback(&self) -> Result<Vec<PageComment>> {
        let corpus = self.search.corpus();
        let mut feedback = Vec::new();
        for summary in corpus.drafts().await?.into_iter().take(EDUCATION_DRAFTS) {
            match corpus.draft(&summary.id).await {
                Ok(Some(draft)) => {
                    feedback.extend(draft.pages.into_iter().rev().flat_map(|p| p.comments));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(draft = %summary.id, "skipping draft: {:#}", e),
            }
        }
        Ok(feedback)
    }
}
