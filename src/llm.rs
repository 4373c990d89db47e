//! Language-model collaborator: client, prompts, and chat history.
//!
//! Defines the [`LanguageModel`] trait and its implementations:
//! - **[`DisabledModel`]**: fails every call; used when `[llm] provider = "disabled"`.
//! - **[`ChatCompletionsModel`]**: OpenAI or Azure OpenAI chat completions
//!   with a JSON-schema response format, so every reply splits into a chat
//!   message and an optional full document rewrite ([`ModelReply`]).
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Callers see any failure as a [`CollaboratorFailure`] carrying the
//! underlying message verbatim.

use anyhow::{bail, Result};
use async_trait::async_trait;
use draftdesk_core::annotate::CommentInstruction;
use draftdesk_core::models::PageComment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::LlmConfig;
use crate::models::ModelReply;

/// Reference reports injected into the compose prompt.
pub const COMPOSE_REFERENCES: usize = 5;
/// Drafts whose reviewer comments are injected into the education prompt.
pub const EDUCATION_DRAFTS: usize = 3;
/// Reference reports injected into the education prompt.
pub const EDUCATION_REFERENCES: usize = 3;
/// Reference reports injected into the comment-apply prompt.
pub const APPLY_REFERENCES: usize = 3;

const SYSTEM_PROMPT_COMPOSE_FILE: &str = "system_prompt_compose.txt";
const SYSTEM_PROMPT_EDUCATION_FILE: &str = "system_prompt_education.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A failed language-model call. The message is surfaced to clients as is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CollaboratorFailure(pub String);

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<ModelReply>;
}

/// Call `model`, turning every error into a [`CollaboratorFailure`].
pub async fn ask(
    model: &dyn LanguageModel,
    messages: &[ChatMessage],
) -> std::result::Result<ModelReply, CollaboratorFailure> {
    tracing::info!(model = model.name(), messages = messages.len(), "calling language model");
    model.complete(messages).await.map_err(|e| {
        tracing::warn!(model = model.name(), "language model call failed: {:#}", e);
        CollaboratorFailure(format!("{:#}", e))
    })
}

/// Build the model named in `[llm]`.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" => Ok(Arc::new(ChatCompletionsModel::openai(config)?)),
        "azure" => Ok(Arc::new(ChatCompletionsModel::azure(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ Disabled Model ============

pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<ModelReply> {
        bail!("Language model is disabled. Set [llm] provider in config.")
    }
}

// ============ Chat Completions Model ============

enum Auth {
    Bearer(String),
    ApiKey(String),
}

/// OpenAI-compatible chat completions client (OpenAI or Azure OpenAI).
pub struct ChatCompletionsModel {
    client: reqwest::Client,
    url: String,
    auth: Auth,
    model: String,
    /// Azure addresses the deployment in the URL and rejects a `model` field.
    send_model: bool,
    temperature: f64,
    max_retries: u32,
}

impl ChatCompletionsModel {
    pub fn openai(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config
            .endpoint
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/');
        Ok(Self {
            client: build_client(config)?,
            url: format!("{}/chat/completions", base),
            auth: Auth::Bearer(api_key),
            model: config.model.clone(),
            send_model: true,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    pub fn azure(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("AZURE_OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("AZURE_OPENAI_API_KEY environment variable not set"))?;
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("llm.endpoint required for Azure provider"))?
            .trim_end_matches('/');
        Ok(Self {
            client: build_client(config)?,
            url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, config.model, config.api_version
            ),
            auth: Auth::ApiKey(api_key),
            model: config.model.clone(),
            send_model: false,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "messages": messages,
            "temperature": self.temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "chat_response",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "chat_message": { "type": "string" },
                            "report_content": { "type": ["string", "null"] }
                        },
                        "required": ["chat_message", "report_content"],
                        "additionalProperties": false
                    }
                }
            }
        });
        if self.send_model {
            body["model"] = serde_json::Value::String(self.model.clone());
        }
        body
    }
}

fn build_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

#[async_trait]
impl LanguageModel for ChatCompletionsModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<ModelReply> {
        let body = self.request_body(messages);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying language model call");
                tokio::time::sleep(delay).await;
            }

            let request = self.client.post(&self.url).json(&body);
            let request = match &self.auth {
                Auth::Bearer(key) => request.header("Authorization", format!("Bearer {}", key)),
                Auth::ApiKey(key) => request.header("api-key", key),
            };

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion(&json);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Chat completions API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429): fail now
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Chat completions API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("Chat completions request failed: {}", e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Chat completion failed after retries")))
    }
}

/// Extract the structured reply from a chat completions response.
fn parse_completion(json: &serde_json::Value) -> Result<ModelReply> {
    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing message content"))?;

    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid completion response: reply is not the expected JSON: {}", e))
}

// ============ Prompts ============

const DEFAULT_COMPOSE_PROMPT: &str = "\
You are an assistant that helps employees write their weekly reports.

## Your role
- When the user describes what they want to write, produce a well-formed weekly report.
- When the user provides a report, suggest improvements or revise it.

## Output format
Reply in JSON:
- `chat_message`: explanation or advice for the user.
- `report_content`: the full report text when you wrote or revised it, otherwise null.";

const DEFAULT_EDUCATION_PROMPT: &str = "\
You are an assistant that teaches employees how to write good weekly reports.

## Your role
- Give concrete feedback on the user's report.
- Point out both strengths and things to improve.

## Output format
Reply in JSON:
- `chat_message`: educational feedback and advice for the user.
- `report_content`: the full revised report, or null when only giving advice.";

const APPLY_COMMENTS_PROMPT: &str = "\
You are an assistant that revises weekly reports.

## Your role
The user has attached comments (revision instructions) to parts of a weekly report.
Each comment consists of the selected text it targets and an instruction.
Revise the report so that every instruction is followed.

## Output format
Reply in JSON:
- `chat_message`: a short summary of what was changed and where.
- `report_content`: the full revised report text. Always set this.

## Guidelines
- Follow each comment's instruction faithfully.
- Do not change passages that have no comment.
- Keep the report consistent as a whole.";

/// System prompts, optionally overridden by files in `[llm] prompt_dir`.
#[derive(Debug, Clone)]
pub struct Prompts {
    compose: String,
    education: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            compose: DEFAULT_COMPOSE_PROMPT.to_string(),
            education: DEFAULT_EDUCATION_PROMPT.to_string(),
        }
    }
}

impl Prompts {
    /// Load overrides from `dir`; missing files keep the built-in prompt.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut prompts = Self::default();
        let Some(dir) = dir else {
            return Ok(prompts);
        };
        if let Some(text) = read_prompt(dir, SYSTEM_PROMPT_COMPOSE_FILE)? {
            prompts.compose = text;
        }
        if let Some(text) = read_prompt(dir, SYSTEM_PROMPT_EDUCATION_FILE)? {
            prompts.education = text;
        }
        Ok(prompts)
    }

    /// Compose-mode system prompt with up to [`COMPOSE_REFERENCES`] examples.
    pub fn compose_system(&self, references: &[String]) -> String {
        let mut prompt = self.compose.clone();
        append_references(&mut prompt, "Reference: past reports", references, COMPOSE_REFERENCES);
        prompt
    }

    /// Education-mode system prompt with past reviewer comments and up to
    /// [`EDUCATION_REFERENCES`] completed reports.
    pub fn education_system(&self, feedback: &[PageComment], references: &[String]) -> String {
        let mut prompt = self.education.clone();
        if !feedback.is_empty() {
            let examples: Vec<String> = feedback
                .iter()
                .map(|c| format!("- Reviewer: {}\n  Comment: {}", c.author, c.text))
                .collect();
            prompt.push_str("\n\n## Reference: past reviewer comments\n\n");
            prompt.push_str(&examples.join("\n"));
        }
        append_references(
            &mut prompt,
            "Reference: completed reports",
            references,
            EDUCATION_REFERENCES,
        );
        prompt
    }

    /// Messages asking the model to apply every comment to `document`.
    pub fn apply_comments_messages(
        &self,
        document: &str,
        comments: &[CommentInstruction],
        references: &[String],
    ) -> Vec<ChatMessage> {
        let mut system = APPLY_COMMENTS_PROMPT.to_string();
        append_references(&mut system, "Reference: past reports", references, APPLY_REFERENCES);

        let details: Vec<String> = comments
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "Comment {}:\n  Selected text: \"{}\"\n  Instruction: {}",
                    i + 1,
                    c.selected_text,
                    c.text
                )
            })
            .collect();
        let user = format!(
            "Revise the following report according to the comments.\n\n[Report]\n{}\n\n[Comments]\n{}",
            document,
            details.join("\n\n")
        );
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }
}

fn read_prompt(dir: &Path, file: &str) -> Result<Option<String>> {
    let path = dir.join(file);
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Failed to read prompt {}: {}", path.display(), e))?;
    Ok(Some(text))
}

fn append_references(prompt: &mut String, heading: &str, references: &[String], limit: usize) {
    if references.is_empty() || limit == 0 {
        return;
    }
    let refs: Vec<&str> = references.iter().take(limit).map(String::as_str).collect();
    prompt.push_str(&format!("\n\n## {}\n\n{}", heading, refs.join("\n\n---\n\n")));
}

/// The messages for one chat turn: system prompt, replayed history, then
/// the user message prefixed with the current document when there is one.
pub fn chat_messages(
    system: String,
    history: &[ChatMessage],
    document: &str,
    message: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().cloned());
    let user = if document.trim().is_empty() {
        message.to_string()
    } else {
        format!("[Current document]\n{}\n\n---\n\n{}", document, message)
    };
    messages.push(ChatMessage::user(user));
    messages
}

// ============ Chat History ============

/// Per-session conversation turns. Only the user's own words and the
/// model's chat replies are kept, never the injected document text.
pub struct ChatHistory {
    turns: Mutex<HashMap<String, Vec<ChatMessage>>>,
    max_messages: usize,
}

impl ChatHistory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            turns: Mutex::new(HashMap::new()),
            max_messages,
        }
    }

    /// The last `max_messages` messages of `session`.
    pub async fn recent(&self, session: &str) -> Vec<ChatMessage> {
        let turns = self.turns.lock().await;
        match turns.get(session) {
            Some(messages) => {
                let skip = messages.len().saturating_sub(self.max_messages);
                messages[skip..].to_vec()
            }
            None => Vec::new(),
        }
    }

    pub async fn record(&self, session: &str, user: &str, assistant: &str) {
        let mut turns = self.turns.lock().await;
        let messages = turns.entry(session.to_string()).or_default();
        messages.push(ChatMessage::user(user));
        messages.push(ChatMessage::assistant(assistant));
    }

    pub async fn clear(&self, session: &str) {
        self.turns.lock().await.remove(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_completion_with_report() {
        let json = serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "{\"chat_message\":\"done\",\"report_content\":\"new text\"}"
                }
            }]
        });
        let reply = parse_completion(&json).unwrap();
        assert_eq!(reply.chat_message, "done");
        assert_eq!(reply.report_content.as_deref(), Some("new text"));
    }

    #[test]
    fn test_parse_completion_null_report() {
        let json = serde_json::json!({
            "choices": [{ "message": { "content": "{\"chat_message\":\"hi\",\"report_content\":null}" } }]
        });
        assert_eq!(parse_completion(&json).unwrap().report_content, None);
    }

    #[test]
    fn test_parse_completion_rejects_missing_content() {
        let json = serde_json::json!({ "choices": [] });
        assert!(parse_completion(&json).is_err());
        let json = serde_json::json!({ "choices": [{ "message": { "content": "plain text" } }] });
        assert!(parse_completion(&json).is_err());
    }

    #[test]
    fn test_compose_prompt_caps_references() {
        let refs: Vec<String> = (0..7).map(|i| format!("report {}", i)).collect();
        let prompt = Prompts::default().compose_system(&refs);
        assert!(prompt.contains("report 4"));
        assert!(!prompt.contains("report 5"));
        assert_eq!(prompt.matches("\n\n---\n\n").count(), COMPOSE_REFERENCES - 1);
    }

    #[test]
    fn test_education_prompt_lists_feedback() {
        let feedback = vec![PageComment {
            author: "Sato".to_string(),
            text: "Quantify the result".to_string(),
        }];
        let prompt = Prompts::default().education_system(&feedback, &[]);
        assert!(prompt.contains("- Reviewer: Sato\n  Comment: Quantify the result"));
        assert!(!prompt.contains("completed reports"));
    }

    #[test]
    fn test_apply_comments_messages_render_each_comment() {
        let comments = vec![
            CommentInstruction {
                text: "be specific".to_string(),
                selected_text: "some work".to_string(),
            },
            CommentInstruction {
                text: "drop this".to_string(),
                selected_text: "filler".to_string(),
            },
        ];
        let messages = Prompts::default().apply_comments_messages("did some work. filler", &comments, &[]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].content.contains("Comment 1:\n  Selected text: \"some work\"\n  Instruction: be specific"));
        assert!(messages[1].content.contains("Comment 2:"));
        assert!(messages[1].content.contains("[Report]\ndid some work. filler"));
    }

    #[test]
    fn test_prompt_overrides_from_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(SYSTEM_PROMPT_COMPOSE_FILE), "custom compose").unwrap();
        let prompts = Prompts::load(Some(tmp.path())).unwrap();
        assert!(prompts.compose_system(&[]).starts_with("custom compose"));
        assert_eq!(prompts.education_system(&[], &[]), DEFAULT_EDUCATION_PROMPT);
    }

    #[test]
    fn test_chat_messages_prefix_document() {
        let history = vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")];
        let messages = chat_messages("sys".to_string(), &history, "draft body", "improve it");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].content, "[Current document]\ndraft body\n\n---\n\nimprove it");

        let bare = chat_messages("sys".to_string(), &[], "  ", "hello");
        assert_eq!(bare[1].content, "hello");
    }

    #[tokio::test]
    async fn test_history_keeps_last_messages() {
        let history = ChatHistory::new(4);
        for i in 0..3 {
            history.record("s1", &format!("q{}", i), &format!("a{}", i)).await;
        }
        let recent = history.recent("s1").await;
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].content, "q1");
        assert_eq!(recent[3].content, "a2");

        history.clear("s1").await;
        assert!(history.recent("s1").await.is_empty());
        assert!(history.recent("other").await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_model_fails_as_collaborator_failure() {
        let err = ask(&DisabledModel, &[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(err.0.contains("disabled"));
    }

    #[test]
    fn test_azure_body_omits_model() {
        std::env::set_var("AZURE_OPENAI_API_KEY", "test-key");
        let config = LlmConfig {
            provider: "azure".to_string(),
            endpoint: Some("https://example.openai.azure.com/".to_string()),
            ..LlmConfig::default()
        };
        let model = ChatCompletionsModel::azure(&config).unwrap();
        assert_eq!(
            model.url,
            "https://example.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions?api-version=2024-12-01-preview"
        );
        let body = model.request_body(&[ChatMessage::user("hi")]);
        assert!(body.get("model").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
