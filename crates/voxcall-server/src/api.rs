//! Shared API plumbing: the JSON error type, blocking-task helper, and the
//! banner and health handlers.

use crate::AppState;
use axum::{
    extract::Extension,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use voxcall_credentials::CredentialError;
use voxcall_sessions::SessionError;
use voxcall_voice::VoiceError;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("upstream failure: {0}")]
    BadGateway(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::PreconditionFailed(msg) => (StatusCode::PRECONDITION_FAILED, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalServerError(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::Missing(_) => ApiError::PreconditionFailed(e.to_string()),
            CredentialError::InvalidCredits(_) => ApiError::BadRequest(e.to_string()),
            _ => ApiError::InternalServerError(e.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(ref sid) => {
                ApiError::NotFound(format!("no transcript for call {}", sid))
            }
            SessionError::EmptyCallSid => ApiError::BadRequest(e.to_string()),
            _ => ApiError::InternalServerError(e.to_string()),
        }
    }
}

impl From<VoiceError> for ApiError {
    fn from(e: VoiceError) -> Self {
        if e.is_upstream_unavailable() {
            ApiError::BadGateway(e.to_string())
        } else if matches!(e, VoiceError::InvalidInput(_)) {
            ApiError::BadRequest(e.to_string())
        } else {
            ApiError::InternalServerError(e.to_string())
        }
    }
}

/// Runs `f` with a pooled connection on the blocking thread pool.
pub(crate) async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> Result<T, ApiError> + Send + 'static,
{
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        f(&mut *conn)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
}

/// Base URL the carrier should use to reach this server, without a trailing
/// slash.
///
/// Prefers `server.public_url`; otherwise derives it from the `Host` and
/// `X-Forwarded-Proto` headers. Returns an empty string when neither is
/// available, which yields host-relative URLs.
pub(crate) fn external_base(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = state.config.server.public_url.as_deref() {
        let url = url.trim().trim_end_matches('/');
        if !url.is_empty() {
            return url.to_string();
        }
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty() && !h.contains('/'));
    match host {
        Some(host) => {
            let scheme = headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .filter(|p| *p == "https" || *p == "http")
                .unwrap_or("http");
            format!("{}://{}", scheme, host)
        }
        None => String::new(),
    }
}

/// Handler for `GET /`.
pub async fn index_handler() -> Json<Value> {
    Json(json!({
        "message": format!("Welcome to the AI calling agent Bot API Ver-{}", env!("CARGO_PKG_VERSION")),
        "status": "success",
    }))
}

/// Handler for `GET /health`.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let db_ok = run_blocking(&state, |conn| {
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| ApiError::InternalServerError(e.to_string()))
    })
    .await
    .is_ok();

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
        .into_response()
}
