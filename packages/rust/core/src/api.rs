//! HTTP API over [`DigestService`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use wikidigest_shared::{Result, SummaryView, WikiDigestError};

use crate::service::DigestService;

type AppState = Arc<DigestService>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Library error rendered as a JSON `{"error": ...}` response.
#[derive(Debug)]
pub struct ApiError(WikiDigestError);

impl From<WikiDigestError> for ApiError {
    fn from(err: WikiDigestError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WikiDigestError::NotFound { .. } => StatusCode::NOT_FOUND,
            WikiDigestError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ParseResponse {
    pub message: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub url: String,
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "name": "WikiDigest",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "parse": "POST /api/v1/parse",
            "summary": "GET /api/v1/summary?url={article_url}",
            "health": "GET /health"
        }
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn parse(
    State(service): State<AppState>,
    Json(req): Json<ParseRequest>,
) -> std::result::Result<Json<ParseResponse>, ApiError> {
    let ticket = service.submit(&req.url)?;
    Ok(Json(ParseResponse {
        message: "Parsing started".into(),
        url: ticket.url,
    }))
}

async fn summary(
    State(service): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> std::result::Result<Json<SummaryView>, ApiError> {
    Ok(Json(service.query(&params.url).await?))
}

// ---------------------------------------------------------------------------
// Router and server
// ---------------------------------------------------------------------------

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/v1/parse", post(parse))
        .route("/api/v1/summary", get(summary))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Bind `host:port` and serve until Ctrl-C.
pub async fn serve(service: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WikiDigestError::Server(format!("failed to bind {addr}: {e}")))?;

    let local: SocketAddr = listener
        .local_addr()
        .map_err(|e| WikiDigestError::Server(e.to_string()))?;
    info!(addr = %local, "WikiDigest API listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .map_err(|e| WikiDigestError::Server(e.to_string()))
}
