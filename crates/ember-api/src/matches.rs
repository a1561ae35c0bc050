use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use ember_types::api::{
    Claims, DislikeResponse, LikeResponse, MatchSummary, MessageResponse, SendMessageRequest,
};

use crate::auth::AppState;
use crate::error::ApiError;

/// Like a user. On a reciprocal like this is the call that forms the match
/// and notifies both participants over the gateway.
pub async fn like(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<LikeResponse>, ApiError> {
    let outcome = state.engine.like(claims.sub, user_id).await?;

    Ok(Json(LikeResponse {
        is_match: outcome.matched,
        match_summary: outcome.match_summary,
    }))
}

pub async fn dislike(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<DislikeResponse>, ApiError> {
    state.engine.dislike(claims.sub, user_id).await?;
    Ok(Json(DislikeResponse { ok: true }))
}

/// The caller's active matches, newest first.
pub async fn list_matches(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MatchSummary>>, ApiError> {
    let matches = state.engine.matches_for(claims.sub).await?;
    Ok(Json(matches))
}

/// Soft-unmatch. The match is deactivated, never deleted.
pub async fn unmatch(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.unmatch(match_id, claims.sub).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let messages = state.engine.messages_for(match_id, claims.sub).await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .engine
        .send_message(match_id, claims.sub, req.content)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}
