//! API v1 routes.

mod queue;
mod rooms;

use axum::Router;
use roomvisor_model::RoomId;

use crate::api::error::{ApiError, FieldError};
use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/rooms", rooms::routes())
        .nest("/queue", queue::routes())
}

/// Parses a room id path segment.
fn parse_room_id(raw: &str, request_id: &str) -> Result<RoomId, ApiError> {
    raw.parse::<RoomId>().map_err(|e| {
        ApiError::bad_request("invalid_room_id", "room id must be a 64-bit integer")
            .with_details(vec![FieldError {
                field: "room_id".to_string(),
                message: e.to_string(),
            }])
            .with_request_id(request_id.to_string())
    })
}
