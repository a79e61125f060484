//! In-process stream and presence services.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use roomvisor_model::RoomId;

use super::{AdapterError, CurrentItem, PresenceService, StreamHandle, StreamService};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Stream service that hands out node ids from a fixed pool.
pub struct FakeStreamService {
    node_ids: Vec<String>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<AdapterError>>,
}

impl Default for FakeStreamService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStreamService {
    pub fn new() -> Self {
        Self::with_nodes(["relay-1"])
    }

    /// Round-robins over `node_ids`.
    pub fn with_nodes<I, S>(node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            node_ids: node_ids.into_iter().map(Into::into).collect(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Fails the next call with `err`. Queued failures are used in order.
    pub fn fail_next(&self, err: AdapterError) {
        lock(&self.failures).push_back(err);
    }

    /// Stream names requested so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl StreamService for FakeStreamService {
    async fn create_stream(&self, name: &str) -> Result<StreamHandle, AdapterError> {
        let index = {
            let mut calls = lock(&self.calls);
            calls.push(name.to_string());
            calls.len() - 1
        };
        if let Some(err) = lock(&self.failures).pop_front() {
            return Err(err);
        }
        if self.node_ids.is_empty() {
            return Err(AdapterError::InvalidResponse {
                service: "chakra",
                reason: "stream has no node id".to_string(),
            });
        }
        Ok(StreamHandle {
            node_id: self.node_ids[index % self.node_ids.len()].clone(),
        })
    }
}

/// Presence service that records every item it is given.
#[derive(Default)]
pub struct FakePresenceService {
    calls: Mutex<Vec<(RoomId, CurrentItem)>>,
    failures: Mutex<VecDeque<AdapterError>>,
}

impl FakePresenceService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, err: AdapterError) {
        lock(&self.failures).push_back(err);
    }

    pub fn calls(&self) -> Vec<(RoomId, CurrentItem)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl PresenceService for FakePresenceService {
    async fn set_current_item(
        &self,
        room_id: RoomId,
        item: CurrentItem,
    ) -> Result<(), AdapterError> {
        lock(&self.calls).push((room_id, item));
        match lock(&self.failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_fake_round_robins_nodes() {
        let streams = FakeStreamService::with_nodes(["a", "b"]);
        assert_eq!(streams.create_stream("1").await.unwrap().node_id, "a");
        assert_eq!(streams.create_stream("2").await.unwrap().node_id, "b");
        assert_eq!(streams.create_stream("3").await.unwrap().node_id, "a");
        assert_eq!(streams.calls(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_presence_fake_fails_once() {
        let presence = FakePresenceService::new();
        presence.fail_next(AdapterError::Unavailable {
            service: "gateway",
            reason: "down".to_string(),
        });

        let item = CurrentItem::relay("a");
        assert!(presence.set_current_item(RoomId::new(1), item.clone()).await.is_err());
        assert!(presence.set_current_item(RoomId::new(1), item).await.is_ok());
        assert_eq!(presence.calls().len(), 2);
    }
}
