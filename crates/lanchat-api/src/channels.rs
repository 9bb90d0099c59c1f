use axum::{
    Extension, Json,
    extract::{Query, State, rejection::JsonRejection},
    response::IntoResponse,
};
use serde::Deserialize;

use lanchat_types::api::{ChannelsResponse, CreateDmRequest, CreateDmResponse, MembersResponse};

use crate::auth::{AppState, AuthUser};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct MembersQuery {
    pub channel_id: Option<String>,
}

pub async fn list_channels(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let channels = state.router.list_channels(&user.user_id).await?;
    Ok(Json(ChannelsResponse { channels }))
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<MembersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let channel_id = query
        .channel_id
        .filter(|c| !c.is_empty())
        .ok_or(ApiError::BadRequest("missing channel_id"))?;

    let members = state.router.list_members(&user.user_id, &channel_id).await?;
    Ok(Json(MembersResponse { members }))
}

pub async fn create_dm(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<CreateDmRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::BadRequest("invalid request"))?;
    if req.target_user_id.is_empty() {
        return Err(ApiError::BadRequest("missing target_user_id"));
    }

    let channel_id = state.router.create_dm(&user.user_id, &req.target_user_id).await?;
    Ok(Json(CreateDmResponse { channel_id }))
}
