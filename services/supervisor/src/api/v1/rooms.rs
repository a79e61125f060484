//! Room admission endpoints.
//!
//! - `PUT /v1/rooms/{room_id}` starts a room or queues it
//! - `DELETE /v1/rooms/{room_id}` tears it down and admits the next queued room

use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::put,
    Json, Router,
};
use roomvisor_model::Region;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::parse_room_id;
use crate::api::error::{ApiError, FieldError};
use crate::api::request_context::RequestContext;
use crate::coordinator::DeployOutcome;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/{room_id}", put(deploy_room).delete(destroy_room))
}

/// Body of a deploy request. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployRoomRequest {
    #[serde(default)]
    pub region: Region,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Running,
    Queued,
}

#[derive(Debug, Serialize)]
pub struct DeployRoomResponse {
    pub status: RoomStatus,

    /// 0-based queue position; only for newly queued rooms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
}

impl From<DeployOutcome> for DeployRoomResponse {
    fn from(outcome: DeployOutcome) -> Self {
        match outcome {
            DeployOutcome::AlreadyQueued => Self {
                status: RoomStatus::Queued,
                position: None,
            },
            DeployOutcome::Queued { position } => Self {
                status: RoomStatus::Queued,
                position: Some(position),
            },
            DeployOutcome::Provisioned { .. } => Self {
                status: RoomStatus::Running,
                position: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DestroyRoomResponse {}

fn parse_body(body: &Bytes, request_id: &str) -> Result<DeployRoomRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(DeployRoomRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        ApiError::bad_request("invalid_request", "request body is not a valid deploy request")
            .with_details(vec![FieldError {
                field: "body".to_string(),
                message: e.to_string(),
            }])
            .with_request_id(request_id.to_string())
    })
}

async fn deploy_room(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(room_id): Path<String>,
    body: Bytes,
) -> Result<Json<DeployRoomResponse>, ApiError> {
    let room_id = parse_room_id(&room_id, &ctx.request_id)?;
    let request = parse_body(&body, &ctx.request_id)?;

    info!(
        request_id = %ctx.request_id,
        room_id = %room_id,
        region = %request.region,
        "Deploy requested"
    );

    let coordinator = state.coordinator();
    let deadline = coordinator.request_deadline();
    let outcome = coordinator
        .deploy(room_id, request.region, &deadline)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok(Json(outcome.into()))
}

async fn destroy_room(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(room_id): Path<String>,
) -> Result<Json<DestroyRoomResponse>, ApiError> {
    let room_id = parse_room_id(&room_id, &ctx.request_id)?;

    info!(request_id = %ctx.request_id, room_id = %room_id, "Destroy requested");

    let coordinator = state.coordinator();
    let deadline = coordinator.request_deadline();
    coordinator
        .destroy(room_id, &deadline)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok(Json(DestroyRoomResponse {}))
}
