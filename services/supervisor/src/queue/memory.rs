//! In-memory admission queue for tests and single-process runs.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use roomvisor_model::{Region, RoomId};

use super::{now_unix, AdmissionQueue, QueueEntry, QueueError};

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Default)]
struct Inner {
    order: BTreeSet<(i64, String)>,
    entries: HashMap<String, QueueEntry>,
}

impl Inner {
    fn rank_of(&self, key: &(i64, String)) -> u64 {
        self.order.range(..key.clone()).count() as u64
    }

    fn insert_nx(&mut self, entry: QueueEntry) -> u64 {
        let member = entry.member();
        if let Some(existing) = self.entries.get(&member) {
            return self.rank_of(&existing.sort_key());
        }

        let key = entry.sort_key();
        self.order.insert(key.clone());
        self.entries.insert(member, entry);
        self.rank_of(&key)
    }
}

/// Ordered set held behind a mutex; every operation takes the lock once,
/// which gives the same atomicity as the Postgres statements.
pub struct MemoryAdmissionQueue {
    inner: Mutex<Inner>,
    clock: Clock,
}

impl MemoryAdmissionQueue {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(now_unix))
    }

    /// Use a custom enqueue clock (unix seconds).
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Snapshot of the pending entries in pop order.
    pub fn entries(&self) -> Vec<QueueEntry> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|(_, member)| inner.entries.get(member).cloned())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryAdmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdmissionQueue for MemoryAdmissionQueue {
    async fn add(&self, room_id: RoomId, region: Region) -> Result<u64, QueueError> {
        let enqueued_at = (self.clock)();
        Ok(self.lock().insert_nx(QueueEntry {
            room_id,
            region,
            enqueued_at,
        }))
    }

    async fn requeue(&self, entry: &QueueEntry) -> Result<u64, QueueError> {
        Ok(self.lock().insert_nx(entry.clone()))
    }

    async fn pop(&self) -> Result<Option<QueueEntry>, QueueError> {
        let mut inner = self.lock();
        let Some((_, member)) = inner.order.pop_first() else {
            return Ok(None);
        };
        Ok(inner.entries.remove(&member))
    }

    async fn has(&self, room_id: RoomId) -> Result<bool, QueueError> {
        Ok(self.lock().entries.contains_key(&room_id.to_string()))
    }

    async fn size(&self) -> Result<u64, QueueError> {
        Ok(self.lock().entries.len() as u64)
    }
}
