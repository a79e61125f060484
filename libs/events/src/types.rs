//! Notification payloads.

use serde::{Deserialize, Serialize};

use crate::{Opcode, Permissions, ServerMessage};

/// Queue position update for a room waiting on capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueUpdate {
    /// Whether the room is still waiting in the admission queue.
    pub active: bool,
    /// 0-based rank among pending rooms.
    pub position: i64,
}

impl QueueUpdate {
    /// The room was just enqueued at `position`.
    pub fn enqueued(position: i64) -> Self {
        Self {
            active: true,
            position,
        }
    }

    /// The room left the queue and is being provisioned.
    pub fn admitted() -> Self {
        Self {
            active: false,
            position: 0,
        }
    }

    /// Wraps the update for room managers only.
    pub fn into_message(self) -> ServerMessage<QueueUpdate> {
        ServerMessage::new(Permissions::MANAGE_ROOM, Opcode::QueueUpdate, self)
    }
}
