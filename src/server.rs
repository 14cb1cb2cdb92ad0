//! HTTP server.
//!
//! Exposes the upload and chat flows of [`ChatService`] as a JSON API for
//! the browser frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart: up to 3 `files` parts and/or a `gdoc_link` field |
//! | `POST` | `/chat` | JSON `{ "query": "...", "history": [{ "role", "content" }] }` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every failure is a JSON object with a single `error` string:
//!
//! ```json
//! { "error": "You can upload a maximum of 3 documents." }
//! ```
//!
//! Input problems, an uninitialized knowledge base and uploads that yield no
//! text are `400`; everything else is `500`.
//!
//! Request work runs on its own task, so a client disconnecting mid-request
//! does not stop the fetch, store or model calls already under way.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::ChatError;
use crate::ingest::UploadedFile;
use crate::models::{ChatMessage, Role};
use crate::pipeline::{ChatService, UPLOAD_SUCCESS_MESSAGE};
use crate::router::HISTORY_LIMIT;

/// Request bodies above this size are rejected before reaching a handler.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

const MISSING_QUERY: &str = "Invalid request: 'query' field is required.";

/// Starts the HTTP server on `[server].bind` with production collaborators.
///
/// Runs until the process is terminated. Fails before binding if any
/// collaborator cannot be constructed.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(ChatService::from_config(config).await?);
    serve(&config.server.bind, service).await
}

/// Serve an already-assembled service.
pub async fn serve(bind_addr: &str, service: Arc<ChatService>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Chat server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(service)).await?;
    Ok(())
}

pub fn build_router(service: Arc<ChatService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        if err.is_client_error() {
            bad_request(err.to_string())
        } else {
            error!("Request failed: {:#}", err);
            internal(err.to_string())
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        bad_request(err.body_text())
    }
}

/// Run request work on its own task so it completes even if the client
/// goes away.
async fn detached<T, F>(work: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, ChatError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result.map_err(AppError::from),
        Err(e) => {
            error!("Request task failed: {}", e);
            Err(internal("request task failed"))
        }
    }
}

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

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    chunks: usize,
}

/// Handler for `POST /upload`.
///
/// Every `files` part counts toward the file limit. A part with an empty file
/// name (what browsers send for an empty file input) is then skipped by the
/// ingestor.
async fn handle_upload(
    State(service): State<Arc<ChatService>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut files = Vec::new();
    let mut doc_link: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("files") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                files.push(UploadedFile::new(file_name, bytes.to_vec()));
            }
            Some("gdoc_link") => {
                doc_link = Some(field.text().await?);
            }
            _ => {}
        }
    }

    let summary = detached(async move { service.upload(files, doc_link.as_deref()).await }).await?;

    Ok(Json(UploadResponse {
        message: UPLOAD_SUCCESS_MESSAGE.to_string(),
        chunks: summary.chunks,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    query: Option<String>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

/// History as sent by the frontend. The window is taken over raw entries;
/// entries with unknown roles inside it are then skipped.
#[derive(Deserialize)]
struct HistoryEntry {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
}

impl HistoryEntry {
    fn into_message(self) -> Option<ChatMessage> {
        Role::from_history(&self.role).map(|role| ChatMessage {
            role,
            content: self.content,
        })
    }
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

/// Handler for `POST /chat`.
///
/// A body that is not JSON, or has no `query`, is a `400`.
async fn handle_chat(
    State(service): State<Arc<ChatService>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = payload.map_err(|_| bad_request(MISSING_QUERY))?;
    let query = request.query.ok_or_else(|| bad_request(MISSING_QUERY))?;
    let mut entries = request.history;
    let start = entries.len().saturating_sub(HISTORY_LIMIT);
    let history: Vec<ChatMessage> = entries
        .drain(start..)
        .filter_map(HistoryEntry::into_message)
        .collect();

    let response = detached(async move { service.chat(&query, &history).await }).await?;

    Ok(Json(ChatResponse { response }))
}
