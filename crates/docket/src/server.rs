//! HTTP surface: `GET /health`, `POST /search`, `POST /ask`.
//!
//! Errors are JSON bodies `{"error": "message"}`. A bad filter value is 400;
//! an embedder failure is 503. Everything after embedding degrades instead of
//! failing, so a well-formed request otherwise always gets a 200.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use docket_answer::AnswerService;
use docket_core::{AnswerMode, AnswerSource, Error, Filter, ResolvedContext};
use docket_query::{ParsedQuery, QueryParser};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared handler state.
pub struct AppState {
    pub service: AnswerService,
    pub parser: QueryParser,
    pub default_collection: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// Invalid request parameters (400).
    BadRequest(String),
    /// The embedder could not be reached (503).
    ServiceUnavailable(String),
    /// Unexpected server error (500).
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidFilter(msg) => Self::BadRequest(msg),
            Error::Embedding(e) => Self::ServiceUnavailable(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Body of `POST /search`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    pub question: String,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub path_contains: Option<String>,
    #[serde(default)]
    pub file_ext: Option<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
}

/// Body of `POST /ask`.
#[derive(Debug, Clone, Deserialize)]
pub struct AskBody {
    #[serde(flatten)]
    pub search: SearchRequest,
    #[serde(default)]
    pub format: AnswerMode,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub contexts: Vec<ResolvedContext>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub source: AnswerSource,
    pub mode: AnswerMode,
    pub contexts: Vec<ResolvedContext>,
}

/// A validated request.
struct Prepared {
    collection: String,
    query: ParsedQuery,
}

fn prepare(state: &AppState, req: &SearchRequest) -> Result<Prepared, ApiError> {
    if req.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }
    if req.top_k == Some(0) {
        return Err(ApiError::BadRequest("top_k must be positive".to_string()));
    }

    let overrides = Filter::from_parts(
        req.path_contains.clone(),
        req.file_ext.clone(),
        req.date_from.as_deref(),
        req.date_to.as_deref(),
    )?;
    let mut query = state.parser.parse(&req.question).with_overrides(overrides);
    if let Some(k) = req.top_k {
        query.limit = k;
    }

    Ok(Prepared {
        collection: req
            .collection
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| state.default_collection.clone()),
        query,
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Prepared { collection, query } = prepare(&state, &req)?;
    let retrieval = state
        .service
        .retriever()
        .retrieve(&collection, &query.text, query.limit, &query.filter)
        .await?;
    Ok(Json(SearchResponse {
        contexts: retrieval.contexts,
    }))
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskBody>,
) -> Result<Json<AskResponse>, ApiError> {
    let Prepared { collection, query } = prepare(&state, &body.search)?;
    let retrieval = state
        .service
        .retriever()
        .retrieve(&collection, &query.text, query.limit, &query.filter)
        .await?;
    let answer = state
        .service
        .answer_from(&query.text, retrieval, body.format)
        .await;
    Ok(Json(AskResponse {
        answer: answer.text,
        source: answer.source,
        mode: answer.mode,
        contexts: answer.contexts,
    }))
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/ask", post(ask))
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn serve(state: Arc<AppState>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(wait_for_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
