//! Per-region admission gate.
//!
//! Capacity checks and the work they authorise must not interleave with
//! another check against the same nodes. Named regions are disjoint, so each
//! gets its own mutex; `ANY` spans all of them, so it holds the cluster lock
//! exclusively while named regions hold it shared.
//!
//! Lock order is always cluster then region.

use std::collections::HashMap;

use roomvisor_model::Region;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct RegionGate {
    cluster: RwLock<()>,
    regions: HashMap<Region, Mutex<()>>,
}

impl Default for RegionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionGate {
    pub fn new() -> Self {
        Self {
            cluster: RwLock::new(()),
            regions: Region::NAMED
                .iter()
                .map(|region| (*region, Mutex::new(())))
                .collect(),
        }
    }

    /// Waits until no overlapping region holds the gate.
    pub async fn acquire(&self, region: Region) -> RegionPermit<'_> {
        match self.regions.get(&region) {
            Some(mutex) => {
                let cluster = self.cluster.read().await;
                let region = mutex.lock().await;
                RegionPermit {
                    _shared: Some(cluster),
                    _exclusive: None,
                    _region: Some(region),
                }
            }
            None => RegionPermit {
                _shared: None,
                _exclusive: Some(self.cluster.write().await),
                _region: None,
            },
        }
    }
}

/// Held while a region's capacity is checked and consumed.
pub struct RegionPermit<'a> {
    _shared: Option<RwLockReadGuard<'a, ()>>,
    _exclusive: Option<RwLockWriteGuard<'a, ()>>,
    _region: Option<MutexGuard<'a, ()>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_disjoint_regions_do_not_block() {
        let gate = RegionGate::new();
        let _nae = gate.acquire(Region::Nae).await;
        assert!(timeout(SHORT, gate.acquire(Region::Euw)).await.is_ok());
    }

    #[tokio::test]
    async fn test_same_region_is_serialized() {
        let gate = RegionGate::new();
        let nae = gate.acquire(Region::Nae).await;
        assert!(timeout(SHORT, gate.acquire(Region::Nae)).await.is_err());
        drop(nae);
        assert!(timeout(SHORT, gate.acquire(Region::Nae)).await.is_ok());
    }

    #[tokio::test]
    async fn test_any_excludes_named_regions() {
        let gate = RegionGate::new();

        let asia = gate.acquire(Region::Asia).await;
        assert!(timeout(SHORT, gate.acquire(Region::Any)).await.is_err());
        drop(asia);

        let any = gate.acquire(Region::Any).await;
        assert!(timeout(SHORT, gate.acquire(Region::Eue)).await.is_err());
        assert!(timeout(SHORT, gate.acquire(Region::Any)).await.is_err());
        drop(any);
        assert!(timeout(SHORT, gate.acquire(Region::Eue)).await.is_ok());
    }
}
