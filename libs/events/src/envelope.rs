//! Message envelope shared by all room notifications.

use roomvisor_model::RoomId;
use serde::{Deserialize, Serialize, Serializer};

use crate::EventError;

/// Permission bits a subscriber must hold to receive a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u64);

impl Permissions {
    /// Delivered to every member of the room.
    pub const NONE: Permissions = Permissions(0);
    /// Room owners and moderators.
    pub const MANAGE_ROOM: Permissions = Permissions(1 << 3);

    /// Raw bit set.
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Returns true if every bit in `other` is set in `self`.
    pub const fn contains(&self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Packet opcodes understood by room clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    QueueUpdate = 14,
}

impl Opcode {
    pub const fn code(&self) -> u16 {
        *self as u16
    }
}

impl Serialize for Opcode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.code())
    }
}

/// Who a message is delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageTarget {
    pub permissions: Permissions,
}

/// Opcode plus payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Packet<T> {
    pub op: Opcode,
    pub d: T,
}

/// A targeted message for the clients of one room.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerMessage<T> {
    pub target: MessageTarget,
    pub data: Packet<T>,
}

impl<T: Serialize> ServerMessage<T> {
    /// Builds a message for holders of `permissions`.
    pub fn new(permissions: Permissions, op: Opcode, payload: T) -> Self {
        Self {
            target: MessageTarget { permissions },
            data: Packet { op, d: payload },
        }
    }

    /// Encodes the message as the JSON text published on the wire.
    pub fn encode(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Topic carrying notifications for a room.
pub fn room_topic(room_id: RoomId) -> String {
    format!("room.{room_id}")
}
