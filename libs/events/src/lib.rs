//! # roomvisor-events
//!
//! Notifications the supervisor publishes for clients connected to a room.
//!
//! ## Envelope
//!
//! Every message is a [`ServerMessage`]: a [`MessageTarget`] that scopes
//! delivery (for example to members holding `MANAGE_ROOM`) and a [`Packet`]
//! carrying an opcode plus its payload. The schema is a contract with the
//! presence layer; the transport that delivers it is not.
//!
//! ## Topics
//!
//! Messages about a room are published on [`room_topic`].

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use types::*;
