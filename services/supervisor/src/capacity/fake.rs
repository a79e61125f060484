//! In-process capacity provider.
//!
//! Holds a fixed node inventory and tracks which rooms are placed where, so
//! deploys consume capacity and destroys release it.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use roomvisor_model::{Region, RoomId};

use super::{CapacityError, CapacityProvider, Footprint, NodeResources, Quantity};

#[derive(Debug, Clone)]
struct FakeNode {
    region: Option<Region>,
    allocatable: NodeResources,
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, FakeNode>,
    placements: HashMap<RoomId, String>,
    fail_capacity: Option<String>,
    fail_deploy: Option<String>,
}

impl State {
    fn free(&self, node_name: &str, node: &FakeNode, footprint: &Footprint) -> NodeResources {
        let placed = self
            .placements
            .values()
            .filter(|n| n.as_str() == node_name)
            .count() as i64;
        let used = NodeResources::new(
            Quantity::from_millis(footprint.cpu.millis() * placed as i128),
            Quantity::from_millis(footprint.memory.millis() * placed as i128),
        );
        node.allocatable.remaining(&used)
    }

    fn in_region<'a>(
        &'a self,
        region: Region,
    ) -> impl Iterator<Item = (&'a String, &'a FakeNode)> + 'a {
        self.nodes
            .iter()
            .filter(move |(_, node)| region.is_any() || node.region == Some(region))
    }
}

/// Capacity provider backed by an in-memory node list.
pub struct FakeCapacityProvider {
    footprint: Footprint,
    latency: Duration,
    state: Mutex<State>,
    capacity_queries: AtomicU64,
    deploy_calls: AtomicU64,
}

impl Default for FakeCapacityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCapacityProvider {
    /// Empty inventory with a one-core, one-byte room footprint.
    pub fn new() -> Self {
        Self {
            footprint: Footprint {
                cpu: Quantity::from_units(1),
                memory: Quantity::from_units(1),
            },
            latency: Duration::ZERO,
            state: Mutex::new(State::default()),
            capacity_queries: AtomicU64::new(0),
            deploy_calls: AtomicU64::new(0),
        }
    }

    /// Per-room footprint in whole units.
    pub fn with_unit(mut self, memory: i64, cpu: i64) -> Self {
        self.footprint = Footprint {
            cpu: Quantity::from_units(cpu),
            memory: Quantity::from_units(memory),
        };
        self
    }

    /// Adds a node with the given allocatable resources in whole units.
    pub fn with_node(
        self,
        name: impl Into<String>,
        region: Option<Region>,
        memory: i64,
        cpu: i64,
    ) -> Self {
        self.lock().nodes.insert(
            name.into(),
            FakeNode {
                region,
                allocatable: NodeResources::new(
                    Quantity::from_units(cpu),
                    Quantity::from_units(memory),
                ),
            },
        );
        self
    }

    /// Delay applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every capacity query fail until cleared with `None`.
    pub fn fail_capacity(&self, reason: Option<&str>) {
        self.lock().fail_capacity = reason.map(str::to_string);
    }

    /// Makes every deploy fail until cleared with `None`.
    pub fn fail_deploy(&self, reason: Option<&str>) {
        self.lock().fail_deploy = reason.map(str::to_string);
    }

    /// Rooms with a live unit.
    pub fn deployed(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self.lock().placements.keys().copied().collect();
        rooms.sort();
        rooms
    }

    pub fn is_deployed(&self, room_id: RoomId) -> bool {
        self.lock().placements.contains_key(&room_id)
    }

    /// Places a room directly, bypassing `deploy`.
    pub fn place(&self, room_id: RoomId, node: impl Into<String>) {
        self.lock().placements.insert(room_id, node.into());
    }

    pub fn capacity_queries(&self) -> u64 {
        self.capacity_queries.load(Ordering::SeqCst)
    }

    pub fn deploy_calls(&self) -> u64 {
        self.deploy_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl CapacityProvider for FakeCapacityProvider {
    async fn available_rooms(&self, region: Region) -> Result<u64, CapacityError> {
        self.capacity_queries.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let state = self.lock();
        if let Some(reason) = &state.fail_capacity {
            return Err(CapacityError::BackendUnavailable(reason.clone()));
        }
        let free: Vec<NodeResources> = state
            .in_region(region)
            .map(|(name, node)| state.free(name, node, &self.footprint))
            .collect();
        Ok(super::available_units(&free, &self.footprint))
    }

    async fn deploy(&self, room_id: RoomId, region: Region) -> Result<(), CapacityError> {
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let mut state = self.lock();
        if let Some(reason) = &state.fail_deploy {
            return Err(CapacityError::BackendUnavailable(reason.clone()));
        }
        if state.placements.contains_key(&room_id) {
            return Err(CapacityError::AlreadyExists(room_id));
        }

        // Unschedulable rooms stay pending, as an orchestrator would leave them.
        let target = state
            .in_region(region)
            .find(|(name, node)| state.free(name, node, &self.footprint).units(&self.footprint) > 0)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "pending".to_string());
        state.placements.insert(room_id, target);
        Ok(())
    }

    async fn destroy(&self, room_id: RoomId) -> Result<(), CapacityError> {
        self.delay().await;
        match self.lock().placements.remove(&room_id) {
            Some(_) => Ok(()),
            None => Err(CapacityError::NotFound(room_id)),
        }
    }
}
