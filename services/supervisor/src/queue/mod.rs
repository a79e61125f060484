//! Admission queue for rooms waiting on capacity.
//!
//! The queue is an ordered set keyed by room id:
//! - At most one live entry per room (inserts never overwrite)
//! - Ordered by enqueue time at one-second granularity, ties broken by the
//!   string-encoded room id compared byte-wise
//! - `add` inserts and reads the rank in one round trip
//! - `pop` removes the head atomically, so concurrent drains never share an
//!   entry
//!
//! Each entry carries the region it was requested for, so a drain can
//! redeploy with the right node affinity.

mod memory;
mod postgres;

pub use memory::MemoryAdmissionQueue;
pub use postgres::PgAdmissionQueue;

use async_trait::async_trait;
use chrono::Utc;
use roomvisor_model::{Region, RoomId};
use thiserror::Error;

/// Name of the ordered set holding pending rooms.
pub const QUEUE_NAME: &str = "queue";

/// Queue operation errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing store rejected or failed the operation.
    #[error("queue store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A stored entry could not be decoded.
    #[error("corrupt queue entry '{member}': {reason}")]
    Corrupt { member: String, reason: String },
}

/// A room waiting for capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub room_id: RoomId,
    pub region: Region,
    /// Unix timestamp (seconds) of the first enqueue.
    pub enqueued_at: i64,
}

impl QueueEntry {
    /// String form used as the ordered-set member.
    pub fn member(&self) -> String {
        self.room_id.to_string()
    }

    /// Ordering key: enqueue time, then member bytes.
    pub fn sort_key(&self) -> (i64, String) {
        (self.enqueued_at, self.member())
    }
}

/// Durable FIFO of rooms awaiting admission.
#[async_trait]
pub trait AdmissionQueue: Send + Sync {
    /// Inserts the room unless it is already queued and returns its 0-based
    /// rank. Re-adding keeps the original entry and reports its current rank.
    async fn add(&self, room_id: RoomId, region: Region) -> Result<u64, QueueError>;

    /// Puts a popped entry back with its original enqueue time, so it keeps
    /// its place ahead of rooms that arrived later.
    async fn requeue(&self, entry: &QueueEntry) -> Result<u64, QueueError>;

    /// Removes and returns the head of the queue; `None` when empty.
    async fn pop(&self) -> Result<Option<QueueEntry>, QueueError>;

    async fn has(&self, room_id: RoomId) -> Result<bool, QueueError>;

    async fn size(&self) -> Result<u64, QueueError>;
}

/// Current enqueue timestamp.
pub(crate) fn now_unix() -> i64 {
    Utc::now().timestamp()
}

pub(crate) fn decode_entry(
    member: String,
    region: &str,
    enqueued_at: i64,
) -> Result<QueueEntry, QueueError> {
    let room_id = member.parse::<RoomId>().map_err(|e| QueueError::Corrupt {
        member: member.clone(),
        reason: e.to_string(),
    })?;
    let region = region.parse::<Region>().map_err(|e| QueueError::Corrupt {
        member: member.clone(),
        reason: e.to_string(),
    })?;

    Ok(QueueEntry {
        room_id,
        region,
        enqueued_at,
    })
}
