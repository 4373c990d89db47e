//! HTTP API for the report-writing assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/reports/completed` | List completed reports |
//! | `GET`  | `/api/reports/completed/{id}` | One completed report |
//! | `GET`  | `/api/reports/drafts` | List drafts with page counts |
//! | `GET`  | `/api/reports/drafts/{id}` | Draft pages and resolved revision chain |
//! | `POST` | `/api/search` | Related reports for `{query, top_k}` |
//! | `POST` | `/api/sessions` | Create a compose session from `text` or `draft_id` |
//! | `GET`  | `/api/sessions/{id}` | Session text, runs, and comments |
//! | `DELETE` | `/api/sessions/{id}` | Drop a session |
//! | `POST` | `/api/sessions/{id}/edits` | Apply an `insert`, `insert_plain`, `delete`, or `replace` edit |
//! | `POST` | `/api/sessions/{id}/comments` | Anchor a comment to `{start, length}` |
//! | `DELETE` | `/api/sessions/{id}/comments/{cid}` | Remove a comment (no-op if absent) |
//! | `POST` | `/api/sessions/{id}/comments/clear` | Remove every comment |
//! | `POST` | `/api/sessions/{id}/apply-comments` | Rewrite the document following its comments |
//! | `POST` | `/api/sessions/{id}/chat` | Chat about the session's document |
//! | `POST` | `/api/chat` | Stateless chat turn `{session_id?, message, mode, editor_content}` |
//! | `POST` | `/api/chat/clear` | Drop a chat history |
//! | `POST` | `/api/apply-comments` | Stateless comment apply `{editor_content, comments}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_selection", "message": "no text selected" } }
//! ```
//!
//! Error codes: `bad_request` (400), `no_selection` (400), `not_found` (404),
//! `malformed_revision_chain` (422), `internal` (500),
//! `collaborator_failure` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser editor can
//! be served from anywhere.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use draftdesk_core::annotate::{Comment, CommentId, CommentInstruction, Span};
use draftdesk_core::revision::resolve;
use draftdesk_core::CoreError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::assistant::{Assistant, ChatMode, ChatRequest, ChatResponse, RequestError};
use crate::config::Config;
use crate::corpus::{Corpus, FsCorpus};
use crate::llm::{create_model, CollaboratorFailure, Prompts};
use crate::models::{CompletedReport, CompletedReportContent, DraftDetail, DraftSummary, ModelReply, RelatedReport};
use crate::search::{SearchService, SearchSettings};
use crate::session::{ComposeSession, SessionStore, SessionView};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    search: Arc<SearchService>,
    assistant: Arc<Assistant>,
    sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(search: Arc<SearchService>, assistant: Arc<Assistant>) -> Self {
        Self {
            search,
            assistant,
            sessions: Arc::new(SessionStore::new()),
        }
    }

    fn corpus(&self) -> &Arc<dyn Corpus> {
        self.search.corpus()
    }
}

/// Build state from configuration: filesystem corpus, configured model,
/// prompt overrides.
pub fn state_from_config(config: &Config) -> anyhow::Result<AppState> {
    let corpus: Arc<dyn Corpus> = Arc::new(FsCorpus::new(&config.corpus)?);
    let search = Arc::new(SearchService::new(
        corpus,
        SearchSettings::from(&config.retrieval),
    ));
    let model = create_model(&config.llm)?;
    let prompts = Prompts::load(config.llm.prompt_dir.as_deref())?;
    let assistant = Arc::new(Assistant::new(
        search.clone(),
        model,
        prompts,
        config.llm.history_turns,
    ));
    Ok(AppState::new(search, assistant))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/reports/completed", get(handle_completed_list))
        .route("/api/reports/completed/{id}", get(handle_completed_get))
        .route("/api/reports/drafts", get(handle_drafts_list))
        .route("/api/reports/drafts/{id}", get(handle_draft_get))
        .route("/api/search", post(handle_search))
        .route("/api/sessions", post(handle_session_create))
        .route(
            "/api/sessions/{id}",
            get(handle_session_get).delete(handle_session_delete),
        )
        .route("/api/sessions/{id}/edits", post(handle_session_edit))
        .route("/api/sessions/{id}/comments", post(handle_comment_add))
        .route(
            "/api/sessions/{id}/comments/clear",
            post(handle_comments_clear),
        )
        .route(
            "/api/sessions/{id}/comments/{cid}",
            axum::routing::delete(handle_comment_remove),
        )
        .route(
            "/api/sessions/{id}/apply-comments",
            post(handle_session_apply_comments),
        )
        .route("/api/sessions/{id}/chat", post(handle_session_chat))
        .route("/api/chat", post(handle_chat))
        .route("/api/chat/clear", post(handle_chat_clear))
        .route("/api/apply-comments", post(handle_apply_comments))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = state_from_config(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        addr = %config.server.bind,
        llm = %config.llm.provider,
        "draftdesk server listening"
    );
    println!("Draft Desk server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

/// Maps typed failures carried in `anyhow::Error` to HTTP responses. Each
/// failure is scoped to its request; none of them stops the server.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(core) = err.downcast_ref::<CoreError>() {
            return match core {
                CoreError::NoSelection => {
                    app_error(StatusCode::BAD_REQUEST, "no_selection", core.to_string())
                }
                CoreError::RangeOutOfBounds { .. } => bad_request(core.to_string()),
                CoreError::MalformedRevisionChain(_) => app_error(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "malformed_revision_chain",
                    core.to_string(),
                ),
                CoreError::IndexUnavailable => app_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    core.to_string(),
                ),
            };
        }
        if let Some(request) = err.downcast_ref::<RequestError>() {
            return bad_request(request.to_string());
        }
        if let Some(failure) = err.downcast_ref::<CollaboratorFailure>() {
            return app_error(
                StatusCode::BAD_GATEWAY,
                "collaborator_failure",
                failure.0.clone(),
            );
        }
        tracing::error!("request failed: {:#}", err);
        app_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            format!("{:#}", err),
        )
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        anyhow::Error::from(err).into()
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Reports ============

async fn handle_completed_list(State(state): State<AppState>) -> ApiResult<Vec<CompletedReport>> {
    Ok(Json(state.corpus().completed_list().await?))
}

async fn handle_completed_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<CompletedReportContent> {
    state
        .corpus()
        .completed_document(&id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("report not found: {}", id)))
}

async fn handle_drafts_list(State(state): State<AppState>) -> ApiResult<Vec<DraftSummary>> {
    Ok(Json(state.corpus().drafts().await?))
}

async fn handle_draft_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DraftDetail> {
    let draft = state
        .corpus()
        .draft(&id)
        .await?
        .ok_or_else(|| not_found(format!("draft not found: {}", id)))?;
    Ok(Json(DraftDetail::resolve(draft)?))
}

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
    top_k: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<Vec<RelatedReport>> {
    let top_k = req.top_k.unwrap_or(state.search.settings().top_k);
    Ok(Json(state.search.related(&req.query, top_k).await?))
}

// ============ Sessions ============

#[derive(Deserialize)]
struct CreateSessionRequest {
    text: Option<String>,
    draft_id: Option<String>,
}

async fn handle_session_create(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let session = match (req.draft_id, req.text) {
        (Some(_), Some(_)) => return Err(bad_request("pass either text or draft_id, not both")),
        (Some(draft_id), None) => {
            let draft = state
                .corpus()
                .draft(&draft_id)
                .await?
                .ok_or_else(|| not_found(format!("draft not found: {}", draft_id)))?;
            let chain = resolve(&draft.pages)?;
            ComposeSession::from_chain(&draft_id, &chain)
        }
        (None, text) => ComposeSession::new(text.as_deref().unwrap_or("")),
    };
    let view = session.view();
    state.sessions.insert(session).await;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn find_session(
    state: &AppState,
    id: &str,
) -> Result<Arc<Mutex<ComposeSession>>, AppError> {
    let missing = || not_found(format!("session not found: {}", id));
    let uuid = Uuid::parse_str(id).map_err(|_| missing())?;
    state.sessions.get(&uuid).await.ok_or_else(missing)
}

async fn handle_session_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionView> {
    let session = find_session(&state, &id).await?;
    let view = session.lock().await.view();
    Ok(Json(view))
}

async fn handle_session_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let session = find_session(&state, &id).await?;
    let uuid = session.lock().await.id();
    state.sessions.remove(&uuid).await;
    state.assistant.clear_history(&uuid.to_string()).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum EditRequest {
    Insert { pos: usize, text: String },
    InsertPlain { pos: usize, text: String },
    Delete { start: usize, length: usize },
    Replace { text: String },
}

async fn handle_session_edit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(edit): Json<EditRequest>,
) -> ApiResult<SessionView> {
    let session = find_session(&state, &id).await?;
    let mut session = session.lock().await;
    let annotations = session.annotations_mut();
    match edit {
        EditRequest::Insert { pos, text } => annotations.insert(pos, &text)?,
        EditRequest::InsertPlain { pos, text } => annotations.insert_plain(pos, &text)?,
        EditRequest::Delete { start, length } => annotations.delete(Span::new(start, length))?,
        EditRequest::Replace { text } => annotations.replace_text(&text),
    }
    Ok(Json(session.view()))
}

#[derive(Deserialize)]
struct AddCommentRequest {
    start: usize,
    length: usize,
    text: String,
}

async fn handle_comment_add(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let session = find_session(&state, &id).await?;
    let comment = session
        .lock()
        .await
        .add_comment(Span::new(req.start, req.length), &req.text)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[derive(Serialize)]
struct RemoveCommentResponse {
    removed: bool,
}

async fn handle_comment_remove(
    State(state): State<AppState>,
    Path((id, cid)): Path<(String, CommentId)>,
) -> ApiResult<RemoveCommentResponse> {
    let session = find_session(&state, &id).await?;
    let removed = session.lock().await.remove_comment(cid);
    Ok(Json(RemoveCommentResponse { removed }))
}

async fn handle_comments_clear(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionView> {
    let session = find_session(&state, &id).await?;
    let mut session = session.lock().await;
    session.annotations_mut().clear_all();
    Ok(Json(session.view()))
}

#[derive(Serialize)]
struct SessionReplyResponse {
    chat_message: String,
    report_content: Option<String>,
    session: SessionView,
}

async fn handle_session_apply_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionReplyResponse> {
    let session = find_session(&state, &id).await?;
    let mut session = session.lock().await;
    let reply = session.apply_comments(&state.assistant).await?;
    Ok(Json(SessionReplyResponse {
        chat_message: reply.chat_message,
        report_content: reply.report_content,
        session: session.view(),
    }))
}

#[derive(Deserialize)]
struct SessionChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    mode: ChatMode,
}

async fn handle_session_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SessionChatRequest>,
) -> ApiResult<SessionReplyResponse> {
    let session = find_session(&state, &id).await?;
    let mut session = session.lock().await;
    let response = session
        .chat(&state.assistant, &req.message, req.mode)
        .await?;
    Ok(Json(SessionReplyResponse {
        chat_message: response.chat_message,
        report_content: response.report_content,
        session: session.view(),
    }))
}

// ============ Stateless chat & apply ============

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    Ok(Json(state.assistant.chat(req).await?))
}

#[derive(Deserialize)]
struct ClearChatRequest {
    #[serde(default)]
    session_id: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
}

async fn handle_chat_clear(
    State(state): State<AppState>,
    Json(req): Json<ClearChatRequest>,
) -> Json<StatusResponse> {
    state.assistant.clear_history(&req.session_id).await;
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

#[derive(Deserialize)]
struct ApplyCommentsRequest {
    #[serde(default)]
    editor_content: String,
    #[serde(default)]
    comments: Vec<CommentInstruction>,
}

async fn handle_apply_comments(
    State(state): State<AppState>,
    Json(req): Json<ApplyCommentsRequest>,
) -> ApiResult<ModelReply> {
    Ok(Json(
        state
            .assistant
            .apply_comments(&req.editor_content, &req.comments)
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::testing::ScriptedModel;
    use crate::corpus::MemoryCorpus;
    use crate::models::Draft;
    use draftdesk_core::models::Page;
    use serde_json::{json, Value};

    fn page(n: usize, content: &str, is_first_draft: bool, is_final: bool) -> Page {
        Page {
            page_number: n,
            content: content.to_string(),
            comments: vec![],
            is_first_draft,
            is_final,
        }
    }

    fn corpus() -> MemoryCorpus {
        MemoryCorpus::new()
            .with_completed("d1", "alpha alpha gamma")
            .with_completed("d2", "delta")
            .with_draft(Draft {
                id: "good".to_string(),
                filename: "good.docx".to_string(),
                pages: vec![page(1, "final text", false, true), page(2, "first", true, false)],
            })
            .with_draft(Draft {
                id: "broken".to_string(),
                filename: "broken.docx".to_string(),
                pages: vec![page(1, "a", false, true), page(2, "b", false, true)],
            })
    }

    async fn spawn(model: ScriptedModel) -> String {
        let search = Arc::new(SearchService::new(Arc::new(corpus()), SearchSettings::default()));
        let assistant = Arc::new(Assistant::new(
            search.clone(),
            Arc::new(model),
            Prompts::default(),
            10,
        ));
        let app = router(AppState::new(search, assistant));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn post(url: &str, body: Value) -> (u16, Value) {
        let resp = reqwest::Client::new().post(url).json(&body).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get_json(url: &str) -> (u16, Value) {
        let resp = reqwest::get(url).await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health_and_reports() {
        let base = spawn(ScriptedModel::default()).await;
        let (status, body) = get_json(&format!("{}/health", base)).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");

        let (_, body) = get_json(&format!("{}/api/reports/completed", base)).await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, body) = get_json(&format!("{}/api/reports/completed/nope", base)).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_draft_chain_and_malformed_draft() {
        let base = spawn(ScriptedModel::default()).await;
        let (status, body) = get_json(&format!("{}/api/reports/drafts/good", base)).await;
        assert_eq!(status, 200);
        assert_eq!(body["revisions"]["chronological"][0]["content"], "first");
        assert_eq!(body["revisions"]["final_revision"]["content"], "final text");

        let (status, body) = get_json(&format!("{}/api/reports/drafts/broken", base)).await;
        assert_eq!(status, 422);
        assert_eq!(body["error"]["code"], "malformed_revision_chain");

        // The other draft is unaffected.
        let (_, body) = get_json(&format!("{}/api/reports/drafts", base)).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_endpoint() {
        let base = spawn(ScriptedModel::default()).await;
        let (status, body) = post(
            &format!("{}/api/search", base),
            json!({ "query": "alpha beta", "top_k": 5 }),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body[0]["document_id"], "d1");
        assert_eq!(body[1]["score"], 0.0);

        let (_, body) = post(&format!("{}/api/search", base), json!({ "query": "" })).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_session_comment_lifecycle() {
        let base = spawn(ScriptedModel::default()).await;
        let (status, session) = post(
            &format!("{}/api/sessions", base),
            json!({ "text": "the quick brown fox" }),
        )
        .await;
        assert_eq!(status, 201);
        let id = session["id"].as_str().unwrap().to_string();

        let (status, body) = post(
            &format!("{}/api/sessions/{}/comments", base, id),
            json!({ "start": 4, "length": 0, "text": "x" }),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "no_selection");

        let (status, comment) = post(
            &format!("{}/api/sessions/{}/comments", base, id),
            json!({ "start": 4, "length": 5, "text": "faster?" }),
        )
        .await;
        assert_eq!(status, 201);
        assert_eq!(comment["anchor_text"], "quick");

        let (_, view) = post(
            &format!("{}/api/sessions/{}/edits", base, id),
            json!({ "op": "insert", "pos": 0, "text": "so, " }),
        )
        .await;
        assert_eq!(view["comments"][0]["spans"][0]["start"], 8);

        let resp = reqwest::Client::new()
            .delete(format!("{}/api/sessions/{}/comments/{}", base, id, comment["id"]))
            .send()
            .await
            .unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["removed"], true);

        let (_, view) = get_json(&format!("{}/api/sessions/{}", base, id)).await;
        assert_eq!(view["comments"], json!([]));
        assert_eq!(view["runs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overflowing_ranges_are_bad_requests() {
        let base = spawn(ScriptedModel::default()).await;
        let (_, session) = post(
            &format!("{}/api/sessions", base),
            json!({ "text": "the quick brown fox" }),
        )
        .await;
        let id = session["id"].as_str().unwrap().to_string();

        let (status, body) = post(
            &format!("{}/api/sessions/{}/comments", base, id),
            json!({ "start": u64::MAX, "length": 2, "text": "x" }),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "bad_request");

        let (status, _) = post(
            &format!("{}/api/sessions/{}/edits", base, id),
            json!({ "op": "delete", "start": u64::MAX, "length": 1 }),
        )
        .await;
        assert_eq!(status, 400);

        let (_, view) = get_json(&format!("{}/api/sessions/{}", base, id)).await;
        assert_eq!(view["text"], "the quick brown fox");
        assert_eq!(view["comments"], json!([]));
    }

    #[tokio::test]
    async fn test_session_from_draft_seeds_final_revision() {
        let base = spawn(ScriptedModel::default()).await;
        let (status, view) = post(
            &format!("{}/api/sessions", base),
            json!({ "draft_id": "good" }),
        )
        .await;
        assert_eq!(status, 201);
        assert_eq!(view["text"], "final text");

        let (status, _) = post(
            &format!("{}/api/sessions", base),
            json!({ "draft_id": "broken" }),
        )
        .await;
        assert_eq!(status, 422);
    }

    #[tokio::test]
    async fn test_apply_comments_failure_is_502_and_keeps_session() {
        let base = spawn(ScriptedModel::default().fail("model overloaded")).await;
        let (_, session) = post(
            &format!("{}/api/sessions", base),
            json!({ "text": "We did stuff." }),
        )
        .await;
        let id = session["id"].as_str().unwrap().to_string();
        post(
            &format!("{}/api/sessions/{}/comments", base, id),
            json!({ "start": 7, "length": 5, "text": "be specific" }),
        )
        .await;

        let (status, body) = post(
            &format!("{}/api/sessions/{}/apply-comments", base, id),
            json!({}),
        )
        .await;
        assert_eq!(status, 502);
        assert_eq!(body["error"]["code"], "collaborator_failure");
        assert_eq!(body["error"]["message"], "model overloaded");

        let (_, view) = get_json(&format!("{}/api/sessions/{}", base, id)).await;
        assert_eq!(view["text"], "We did stuff.");
        assert_eq!(view["comments"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stateless_endpoints_validate_input() {
        let base = spawn(ScriptedModel::default()).await;
        let (status, body) = post(
            &format!("{}/api/chat", base),
            json!({ "message": "   " }),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "bad_request");

        let (status, _) = post(
            &format!("{}/api/apply-comments", base),
            json!({ "editor_content": "text", "comments": [] }),
        )
        .await;
        assert_eq!(status, 400);

        let (status, body) = post(
            &format!("{}/api/chat/clear", base),
            json!({ "session_id": "whatever" }),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let base = spawn(ScriptedModel::default()).await;
        let (status, _) = get_json(&format!("{}/api/sessions/not-a-uuid", base)).await;
        assert_eq!(status, 404);
        let (status, _) = get_json(&format!("{}/api/sessions/{}", base, Uuid::new_v4())).await;
        assert_eq!(status, 404);
    }
}
