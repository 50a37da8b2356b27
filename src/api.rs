//! HTTP API endpoints: read-side views for lobby/room screens plus the
//! administrative manual-cleanup trigger.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::GameError;
use crate::state::AppState;
use crate::types::{CleanupReport, CleanupTrigger, RoomId};

/// Wire shape for API errors, matching the WS Error message
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    msg: String,
}

/// GameError rendered as an HTTP response
pub struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GameError::Validation(_) | GameError::InvalidVote(_) => StatusCode::BAD_REQUEST,
            GameError::Authorization(_) => StatusCode::FORBIDDEN,
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::Phase { .. }
            | GameError::StaleState { .. }
            | GameError::RoomFull
            | GameError::RoomNotJoinable(_) => StatusCode::CONFLICT,
        };
        let body = Json(ErrorBody {
            code: self.0.code().to_string(),
            msg: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

/// List rooms that are waiting for players.
///
/// GET /api/rooms
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.list_available_rooms().await)
}

/// A room with its roster.
///
/// GET /api/rooms/{id}
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.room_view(&room_id).await?))
}

/// The room's session: phase, deadline, round.
///
/// GET /api/rooms/{id}/session
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> Result<impl IntoResponse, ApiError> {
    match state.current_session(&room_id).await {
        Some(session) => Ok(Json(session)),
        None => Err(GameError::NotFound("session".into()).into()),
    }
}

/// Current round's submissions with vote tallies.
///
/// GET /api/rooms/{id}/submissions
pub async fn get_submissions(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.round_submissions(&room_id).await?))
}

/// Voting progress for the current round.
///
/// GET /api/rooms/{id}/progress
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.voting_progress(&room_id).await?))
}

/// Run a cleanup sweep now. For operational use; guarded by admin auth.
///
/// POST /api/admin/cleanup
pub async fn trigger_cleanup(State(state): State<Arc<AppState>>) -> Json<CleanupReport> {
    Json(state.reap_idle(CleanupTrigger::Manual).await)
}
