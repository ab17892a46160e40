//! Chat HTTP server.
//!
//! Exposes the retrieval-augmented chat flow to the website frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Answer a message, optionally with prior turns |
//! | `GET`  | `/api/chat` | 405 with a usage hint |
//! | `POST` | `/api/search` | Scored retrieval results (operator debugging), `k` at most 50 |
//! | `GET`  | `/health` | Health check (version and loaded entry count) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `method_not_allowed` (405),
//! `upstream_error` (502). Provider error detail is logged, never returned.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the site can call the
//! API from another origin during development.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::ask::{AnswerBody, Assistant};
use crate::chat::HttpChatClient;
use crate::config::Config;
use crate::embedding::HttpEmbedder;
use crate::index_store::{fetcher_from_config, IndexStore};
use crate::models::ChatTurn;
use crate::search::SearchResultItem;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    assistant: Arc<Assistant>,
}

impl AppState {
    pub fn new(assistant: Arc<Assistant>) -> Self {
        Self { assistant }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let index = Arc::new(IndexStore::new(fetcher_from_config(config)?));
        let embedder = Arc::new(HttpEmbedder::from_config(config)?);
        let chat = Arc::new(HttpChatClient::from_config(config)?);
        Ok(Self::new(Arc::new(Assistant::new(config, index, embedder, chat))))
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat).get(handle_chat_get))
        .route("/api/search", post(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until the process is terminated.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Starts the chat server on `[server].bind`.
///
/// The index is loaded in the background right away so the first request
/// does not pay for it.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;

    let warm = state.assistant.clone();
    tokio::spawn(async move {
        let entries = warm.index().load().await.len();
        tracing::info!(entries, "index ready");
    });

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Chat server listening on http://{}", bind_addr);

    serve(listener, state).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn upstream_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream_error".to_string(),
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    /// Loaded index entries; 0 until the first load completes.
    entries: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let entries = state
        .assistant
        .index()
        .get()
        .map(|index| index.len())
        .unwrap_or(0);
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        entries,
    })
}

// ============ /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<AnswerBody>, AppError> {
    let Json(req) = payload?;
    let message = req.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    match state.assistant.answer(message, &req.history).await {
        Ok(answer) => Ok(Json(answer.into())),
        Err(e) => {
            tracing::error!(error = %e, "chat request failed");
            Err(upstream_error("the assistant is unavailable right now; please try again later"))
        }
    }
}

async fn handle_chat_get() -> AppError {
    AppError {
        status: StatusCode::METHOD_NOT_ALLOWED,
        code: "method_not_allowed".to_string(),
        message: "Use POST /api/chat with JSON: { \"message\": \"...\", \"history\": [] }"
            .to_string(),
    }
}

// ============ POST /api/search ============

/// Upper bound on `k` accepted from a request body.
pub const MAX_SEARCH_K: usize = 50;

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
    k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResultItem>,
}

async fn handle_search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(req) = payload?;
    let query = req.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let k = req.k.unwrap_or(state.assistant.params().k);
    if k == 0 || k > MAX_SEARCH_K {
        return Err(bad_request(format!("k must be between 1 and {}", MAX_SEARCH_K)));
    }

    let results = state.assistant.retrieve(query, k).await;
    Ok(Json(SearchResponse {
        results: results.iter().map(SearchResultItem::from).collect(),
    }))
}
