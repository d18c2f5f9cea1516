//! Transcript browser.

use crate::api::{run_blocking, ApiError};
use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use voxcall_sessions::{list_sessions, read_session, DEFAULT_LIST_LIMIT};
use voxcall_types::{CallSession, SessionSummary};

#[derive(Debug, Deserialize)]
pub struct TranscriptListQuery {
    /// Maximum sessions to return (default 50, max 500).
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptListResponse {
    pub sessions: Vec<SessionSummary>,
    pub count: usize,
}

/// A full call session plus its transcript rendered one line per turn.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptResponse {
    #[serde(flatten)]
    pub session: CallSession,
    pub lines: Vec<String>,
}

/// Handler for `GET /api/transcripts`.
pub async fn list_transcripts_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<TranscriptListQuery>,
) -> Result<Json<TranscriptListResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let sessions = run_blocking(&state, move |conn| Ok(list_sessions(conn, limit)?)).await?;
    let count = sessions.len();
    Ok(Json(TranscriptListResponse { sessions, count }))
}

/// Handler for `GET /api/transcripts/{call_sid}`.
pub async fn get_transcript_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let session = run_blocking(&state, move |conn| Ok(read_session(conn, &call_sid)?)).await?;
    let lines = session.turns.iter().map(ToString::to_string).collect();
    Ok(Json(TranscriptResponse { session, lines }))
}
