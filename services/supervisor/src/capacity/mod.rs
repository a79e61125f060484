//! Capacity estimation and compute-unit lifecycle.
//!
//! The coordinator only sees the three-method [`CapacityProvider`] contract:
//! - How many more rooms fit in a region
//! - Provision one room
//! - Tear one room down
//!
//! Estimation is a per-node floor calculation, one dimension per resource:
//! `min(floor(mem / unit_mem), floor(cpu / unit_cpu))`, summed over the nodes
//! matching the region. There is no bin-packing or node ranking.

mod fake;
mod kubernetes;
mod quantity;

pub use fake::FakeCapacityProvider;
pub use kubernetes::{KubernetesConfig, KubernetesProvider, RoomPodTemplate};
pub use quantity::{Quantity, QuantityError};

use std::collections::HashMap;

use async_trait::async_trait;
use roomvisor_model::{Region, RoomId};
use thiserror::Error;

/// Capacity backend errors.
#[derive(Debug, Error)]
pub enum CapacityError {
    /// A compute unit already exists for the room.
    #[error("compute unit for room {0} already exists")]
    AlreadyExists(RoomId),

    /// No compute unit exists for the room.
    #[error("no compute unit for room {0}")]
    NotFound(RoomId),

    /// The orchestrator could not be reached or failed the request.
    #[error("capacity backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Resources one room consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    pub cpu: Quantity,
    pub memory: Quantity,
}

/// Resources a node can still give to rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeResources {
    pub cpu: Quantity,
    pub memory: Quantity,
}

impl NodeResources {
    pub fn new(cpu: Quantity, memory: Quantity) -> Self {
        Self { cpu, memory }
    }

    /// Rooms this node can host.
    pub fn units(&self, footprint: &Footprint) -> u64 {
        let by_memory = self.memory.units_of(footprint.memory);
        let by_cpu = self.cpu.units_of(footprint.cpu);
        by_memory.min(by_cpu)
    }

    /// What is left after `used` is committed, floored at zero.
    pub fn remaining(&self, used: &NodeResources) -> NodeResources {
        NodeResources {
            cpu: self.cpu.saturating_sub(used.cpu).max(Quantity::ZERO),
            memory: self.memory.saturating_sub(used.memory).max(Quantity::ZERO),
        }
    }
}

/// Rooms that fit across `nodes`.
pub fn available_units<'a>(
    nodes: impl IntoIterator<Item = &'a NodeResources>,
    footprint: &Footprint,
) -> u64 {
    nodes
        .into_iter()
        .map(|node| node.units(footprint))
        .fold(0u64, u64::saturating_add)
}

/// Maps regions onto a node label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionLabels {
    key: String,
    overrides: HashMap<Region, String>,
}

impl Default for RegionLabels {
    fn default() -> Self {
        Self::new("region")
    }
}

impl RegionLabels {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            overrides: HashMap::new(),
        }
    }

    /// Use `value` instead of the region name as the label value.
    pub fn with_value(mut self, region: Region, value: impl Into<String>) -> Self {
        self.overrides.insert(region, value.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Label value for a named region; `None` for `ANY`.
    pub fn value(&self, region: Region) -> Option<String> {
        if region.is_any() {
            return None;
        }
        Some(
            self.overrides
                .get(&region)
                .cloned()
                .unwrap_or_else(|| region.as_str().to_string()),
        )
    }

    /// `key=value` selector for a named region; `None` for `ANY`.
    pub fn selector(&self, region: Region) -> Option<String> {
        self.value(region).map(|value| format!("{}={}", self.key, value))
    }

    /// Whether a node with `labels` belongs to `region`.
    pub fn matches(&self, region: Region, labels: &HashMap<String, String>) -> bool {
        match self.value(region) {
            None => true,
            Some(value) => labels.get(&self.key) == Some(&value),
        }
    }
}

/// Provisions and tears down the compute unit backing a room.
#[async_trait]
pub trait CapacityProvider: Send + Sync {
    /// Rooms the region can host right now.
    async fn available_rooms(&self, region: Region) -> Result<u64, CapacityError>;

    /// Provisions one unit for the room, pinned to `region` unless `ANY`.
    async fn deploy(&self, room_id: RoomId, region: Region) -> Result<(), CapacityError>;

    /// Removes the room's unit.
    async fn destroy(&self, room_id: RoomId) -> Result<(), CapacityError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn footprint(memory: i64, cpu: i64) -> Footprint {
        Footprint {
            cpu: Quantity::from_units(cpu),
            memory: Quantity::from_units(memory),
        }
    }

    fn node(memory: i64, cpu: i64) -> NodeResources {
        NodeResources::new(Quantity::from_units(cpu), Quantity::from_units(memory))
    }

    #[test]
    fn test_available_units_sums_per_node_minimum() {
        let nodes = [node(8, 4), node(4, 2)];
        assert_eq!(available_units(&nodes, &footprint(2, 1)), 6);
    }

    #[rstest]
    #[case(node(8, 1), 1)]
    #[case(node(3, 4), 1)]
    #[case(node(1, 8), 0)]
    #[case(node(0, 0), 0)]
    fn test_node_units_take_the_scarcer_resource(#[case] n: NodeResources, #[case] expected: u64) {
        assert_eq!(n.units(&footprint(2, 1)), expected);
    }

    #[test]
    fn test_remaining_floors_at_zero() {
        let left = node(4, 2).remaining(&node(6, 1));
        assert_eq!(left.memory, Quantity::ZERO);
        assert_eq!(left.cpu, Quantity::from_units(1));
    }

    #[test]
    fn test_region_labels() {
        let labels = RegionLabels::default().with_value(Region::Euw, "europe-west1");
        assert_eq!(labels.selector(Region::Any), None);
        assert_eq!(labels.selector(Region::Nae).as_deref(), Some("region=NAE"));
        assert_eq!(
            labels.selector(Region::Euw).as_deref(),
            Some("region=europe-west1")
        );

        let node_labels = HashMap::from([("region".to_string(), "europe-west1".to_string())]);
        assert!(labels.matches(Region::Euw, &node_labels));
        assert!(labels.matches(Region::Any, &node_labels));
        assert!(!labels.matches(Region::Nae, &node_labels));
    }
}
