use axum::{
    Extension, Json,
    extract::{Query, State, rejection::JsonRejection},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;

use lanchat_types::api::SendMessageResponse;
use lanchat_types::events::SendRequest;

use crate::auth::{AppState, AuthUser};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub channel_id: Option<String>,
    pub limit: Option<u32>,
    /// Only messages strictly older than this millisecond timestamp.
    pub before: Option<i64>,
}

/// `GET /history?channel_id=..`: newest messages of a channel, oldest
/// first. A user id in `channel_id` names the DM with that user.
pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let channel_id = query
        .channel_id
        .filter(|c| !c.is_empty())
        .ok_or(ApiError::BadRequest("missing channel_id"))?;

    let messages = state
        .router
        .history(&user.user_id, &channel_id, query.limit, query.before)
        .await?;

    Ok(Json(messages))
}

/// `POST /send`: same pipeline as a live frame, for callers without a
/// persistent connection.
pub async fn send(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body.map_err(|e| {
        debug!("invalid send body: {}", e);
        ApiError::BadRequest("invalid request")
    })?;

    let msg = state.router.post(&user.user_id, req).await?;

    Ok(Json(SendMessageResponse {
        message_id: msg.id.to_string(),
        success: true,
    }))
}
