//! Clients for the stream and presence services.
//!
//! The coordinator depends only on [`StreamService`] and [`PresenceService`].
//! Production implementations are gRPC clients in [`grpc`]; [`fake`] holds
//! in-process stand-ins.

mod fake;
mod grpc;
mod retry;

pub use fake::{FakePresenceService, FakeStreamService};
pub use grpc::{ChakraStreamService, GatewayPresenceService, GrpcEndpoints};
pub use retry::{BackoffPolicy, RetryPolicy};

use async_trait::async_trait;
use roomvisor_model::RoomId;
use thiserror::Error;
use tonic::Code;

/// A relay stream allocated for a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    /// Relay node serving the stream.
    pub node_id: String,
}

/// Kind of item a room is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// A relay stream; the url is the relay node id.
    Relay,
}

/// What a room's clients should be showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentItem {
    pub kind: ItemKind,
    pub url: String,
}

impl CurrentItem {
    pub fn relay(node_id: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Relay,
            url: node_id.into(),
        }
    }
}

/// Adapter call errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The remote service answered with a non-OK status.
    #[error("{service} returned {}: {}", .status.code(), .status.message())]
    Rpc {
        service: &'static str,
        status: tonic::Status,
    },

    /// The channel could not be set up.
    #[error("{service} connection failed: {source}")]
    Connect {
        service: &'static str,
        #[source]
        source: tonic::transport::Error,
    },

    /// The remote service answered with something unusable.
    #[error("{service} returned an invalid response: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },

    /// The service cannot take calls right now.
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },
}

impl AdapterError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rpc { status, .. } => matches!(
                status.code(),
                Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted | Code::Aborted
            ),
            Self::Connect { .. } | Self::Unavailable { .. } => true,
            Self::InvalidResponse { .. } => false,
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            Self::Rpc { service, .. }
            | Self::Connect { service, .. }
            | Self::InvalidResponse { service, .. }
            | Self::Unavailable { service, .. } => service,
        }
    }
}

/// Allocates relay streams.
#[async_trait]
pub trait StreamService: Send + Sync {
    /// Creates a stream named `name` and reports the node serving it.
    async fn create_stream(&self, name: &str) -> Result<StreamHandle, AdapterError>;
}

/// Tells a room's clients what is playing.
#[async_trait]
pub trait PresenceService: Send + Sync {
    async fn set_current_item(&self, room_id: RoomId, item: CurrentItem)
        -> Result<(), AdapterError>;
}
