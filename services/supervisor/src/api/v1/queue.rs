//! Admission queue inspection endpoints.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::parse_room_id;
use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(queue_size))
        .route("/{room_id}", get(room_queued))
}

#[derive(Debug, Serialize)]
pub struct QueueSizeResponse {
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct RoomQueuedResponse {
    pub queued: bool,
}

async fn queue_size(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<QueueSizeResponse>, ApiError> {
    let size = state
        .coordinator()
        .queue_size()
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok(Json(QueueSizeResponse { size }))
}

async fn room_queued(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(room_id): Path<String>,
) -> Result<Json<RoomQueuedResponse>, ApiError> {
    let room_id = parse_room_id(&room_id, &ctx.request_id)?;
    let queued = state
        .coordinator()
        .is_queued(room_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok(Json(RoomQueuedResponse { queued }))
}
