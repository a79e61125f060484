//! Deploy coordinator.
//!
//! Decides, per request, whether a room starts now or waits in the
//! admission queue:
//! - A room already queued is left alone
//! - Otherwise capacity is checked under the region gate
//! - No capacity: the room is queued and its managers are told the position
//! - Capacity: the provisioning pipeline runs while the gate is still held
//!
//! Every destroy frees capacity, so it is followed by a detached drain that
//! admits the head of the queue.

mod deadline;
mod gate;
mod pipeline;

pub use deadline::Deadline;
pub use gate::{RegionGate, RegionPermit};
pub use pipeline::{ProvisionError, ProvisionStep, StepFailure};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use roomvisor_events::{room_topic, QueueUpdate};
use roomvisor_model::{Region, RoomId};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::adapters::{PresenceService, StreamService};
use crate::capacity::{CapacityError, CapacityProvider};
use crate::notify::Notifier;
use crate::queue::{AdmissionQueue, QueueEntry, QueueError};
use pipeline::Pipeline;

/// Coordinator errors.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// A call ran out of time before reaching a collaborator's answer.
    #[error("{operation} did not finish before the deadline")]
    DeadlineExceeded { operation: &'static str },
}

impl CoordinatorError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::DeadlineExceeded { .. } => true,
            Self::Provision(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Whether the failure happened before any remote side effect.
    pub fn left_nothing_in_place(&self) -> bool {
        match self {
            Self::Capacity(CapacityError::BackendUnavailable(_)) => true,
            Self::Provision(e) => e.completed.is_empty(),
            _ => false,
        }
    }
}

/// Timing limits.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Budget for one inbound deploy or destroy.
    pub request_timeout: Duration,
    /// Cap on any single collaborator call.
    pub call_timeout: Duration,
    /// Budget for one background drain.
    pub drain_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(60),
        }
    }
}

/// Result of a deploy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The room was already waiting; nothing changed.
    AlreadyQueued,
    /// No capacity; the room waits at `position` (0-based).
    Queued { position: u64 },
    /// The room is running on the relay `node_id`.
    Provisioned { node_id: String },
}

/// Why a drained room went back into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueReason {
    NoCapacity,
    DeadlineExceeded,
    /// A collaborator failed before any provisioning step took effect.
    Unavailable,
}

/// Result of admitting the head of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Empty,
    Provisioned { room_id: RoomId, node_id: String },
    Requeued { room_id: RoomId, reason: RequeueReason },
}

/// Collaborators the coordinator drives.
pub struct Collaborators {
    pub queue: Arc<dyn AdmissionQueue>,
    pub capacity: Arc<dyn CapacityProvider>,
    pub streams: Arc<dyn StreamService>,
    pub presence: Arc<dyn PresenceService>,
    pub notifier: Arc<dyn Notifier>,
}

struct Inner {
    deps: Collaborators,
    gate: RegionGate,
    config: CoordinatorConfig,
}

/// Admission and teardown of rooms. Cheap to clone.
#[derive(Clone)]
pub struct DeployCoordinator {
    inner: Arc<Inner>,
}

impl DeployCoordinator {
    pub fn new(deps: Collaborators, config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                gate: RegionGate::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Deadline for a request arriving now.
    pub fn request_deadline(&self) -> Deadline {
        Deadline::after(self.inner.config.request_timeout)
    }

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            streams: self.inner.deps.streams.as_ref(),
            presence: self.inner.deps.presence.as_ref(),
            capacity: self.inner.deps.capacity.as_ref(),
            call_timeout: self.inner.config.call_timeout,
        }
    }

    /// Runs one collaborator call within the deadline and the per-call cap.
    async fn bounded<T>(
        &self,
        deadline: &Deadline,
        operation: &'static str,
        call: impl Future<Output = T>,
    ) -> Result<T, CoordinatorError> {
        tokio::time::timeout(deadline.budget(self.inner.config.call_timeout), call)
            .await
            .map_err(|_| CoordinatorError::DeadlineExceeded { operation })
    }

    async fn acquire_gate(
        &self,
        region: Region,
        deadline: &Deadline,
    ) -> Result<RegionPermit<'_>, CoordinatorError> {
        tokio::time::timeout(deadline.remaining(), self.inner.gate.acquire(region))
            .await
            .map_err(|_| CoordinatorError::DeadlineExceeded {
                operation: "region_gate",
            })
    }

    /// Starts the room now or queues it until capacity frees up.
    #[instrument(skip_all, fields(room_id = %room_id, region = %region))]
    pub async fn deploy(
        &self,
        room_id: RoomId,
        region: Region,
        deadline: &Deadline,
    ) -> Result<DeployOutcome, CoordinatorError> {
        let deps = &self.inner.deps;

        if self.bounded(deadline, "queue_has", deps.queue.has(room_id)).await?? {
            debug!("Room already queued");
            return Ok(DeployOutcome::AlreadyQueued);
        }

        let _permit = self.acquire_gate(region, deadline).await?;

        let available = self
            .bounded(deadline, "available_rooms", deps.capacity.available_rooms(region))
            .await??;

        if available == 0 {
            let position = self
                .bounded(deadline, "queue_add", deps.queue.add(room_id, region))
                .await??;
            info!(position, "No capacity, room queued");
            self.publish(room_id, QueueUpdate::enqueued(position as i64), deadline)
                .await;
            return Ok(DeployOutcome::Queued { position });
        }

        let handle = self.pipeline().run(room_id, region, deadline).await?;
        info!(node_id = %handle.node_id, available, "Room provisioned");
        Ok(DeployOutcome::Provisioned {
            node_id: handle.node_id,
        })
    }

    /// Tears the room down, then drains the queue whatever the outcome.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn destroy(&self, room_id: RoomId, deadline: &Deadline) -> Result<(), CoordinatorError> {
        let result = self.teardown(room_id, deadline).await;

        match &result {
            Ok(()) => info!("Room destroyed"),
            Err(e) => warn!(error = %e, "Room teardown failed"),
        }

        self.spawn_drain();
        result
    }

    /// Removes the room's unit while no region is mid-decision.
    ///
    /// Holds the whole cluster since the unit's region is unknown. Any
    /// enqueue decided against the old capacity lands before the slot frees.
    async fn teardown(&self, room_id: RoomId, deadline: &Deadline) -> Result<(), CoordinatorError> {
        let _permit = self.acquire_gate(Region::Any, deadline).await?;
        self.bounded(deadline, "destroy_unit", self.inner.deps.capacity.destroy(room_id))
            .await??;
        Ok(())
    }

    /// Admits the head of the queue on a background task.
    ///
    /// Failures are logged and never reach the caller.
    pub fn spawn_drain(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(
            async move {
                match coordinator.deploy_next().await {
                    Ok(DrainOutcome::Empty) => debug!("Queue empty, nothing to drain"),
                    Ok(outcome) => debug!(?outcome, "Queue drained"),
                    Err(e) => error!(error = %e, "Failed to deploy the next room in queue"),
                }
            }
            .instrument(info_span!("drain")),
        )
    }

    /// Pops the head of the queue and provisions it.
    ///
    /// The popped room goes back at its original position when its region
    /// has no capacity or the drain runs out of time.
    pub async fn deploy_next(&self) -> Result<DrainOutcome, CoordinatorError> {
        let deadline = Deadline::after(self.inner.config.drain_timeout);

        let Some(entry) = self
            .bounded(&deadline, "queue_pop", self.inner.deps.queue.pop())
            .await??
        else {
            return Ok(DrainOutcome::Empty);
        };

        let room_id = entry.room_id;
        match self.admit(&entry, &deadline).await {
            Ok(Some(node_id)) => {
                info!(room_id = %room_id, region = %entry.region, node_id = %node_id, "Queued room provisioned");
                self.publish(room_id, QueueUpdate::admitted(), &deadline).await;
                Ok(DrainOutcome::Provisioned { room_id, node_id })
            }
            Ok(None) => {
                self.requeue(&entry).await?;
                Ok(DrainOutcome::Requeued {
                    room_id,
                    reason: RequeueReason::NoCapacity,
                })
            }
            Err(e) if e.is_timeout() => {
                warn!(room_id = %room_id, error = %e, "Drain timed out");
                self.requeue(&entry).await?;
                Ok(DrainOutcome::Requeued {
                    room_id,
                    reason: RequeueReason::DeadlineExceeded,
                })
            }
            Err(e) if e.left_nothing_in_place() => {
                warn!(room_id = %room_id, error = %e, "Drain failed before provisioning started");
                self.requeue(&entry).await?;
                Ok(DrainOutcome::Requeued {
                    room_id,
                    reason: RequeueReason::Unavailable,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Provisions a popped entry; `None` when its region is full.
    async fn admit(
        &self,
        entry: &QueueEntry,
        deadline: &Deadline,
    ) -> Result<Option<String>, CoordinatorError> {
        let _permit = self.acquire_gate(entry.region, deadline).await?;

        let available = self
            .bounded(
                deadline,
                "available_rooms",
                self.inner.deps.capacity.available_rooms(entry.region),
            )
            .await??;
        if available == 0 {
            return Ok(None);
        }

        let handle = self
            .pipeline()
            .run(entry.room_id, entry.region, deadline)
            .await?;
        Ok(Some(handle.node_id))
    }

    async fn requeue(&self, entry: &QueueEntry) -> Result<u64, CoordinatorError> {
        let deadline = Deadline::after(self.inner.config.call_timeout);
        let position = self
            .bounded(&deadline, "queue_requeue", self.inner.deps.queue.requeue(entry))
            .await??;
        info!(room_id = %entry.room_id, region = %entry.region, position, "Room returned to queue");
        Ok(position)
    }

    /// Tells the room's managers about a queue change. Best effort.
    async fn publish(&self, room_id: RoomId, update: QueueUpdate, deadline: &Deadline) {
        let payload = match update.into_message().encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(room_id = %room_id, error = %e, "Failed to encode queue update");
                return;
            }
        };

        let topic = room_topic(room_id);
        match self
            .bounded(deadline, "publish", self.inner.deps.notifier.publish(&topic, &payload))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(room_id = %room_id, error = %e, "Failed to publish queue update"),
            Err(e) => warn!(room_id = %room_id, error = %e, "Failed to publish queue update"),
        }
    }

    pub async fn queue_size(&self) -> Result<u64, CoordinatorError> {
        Ok(self.inner.deps.queue.size().await?)
    }

    pub async fn is_queued(&self, room_id: RoomId) -> Result<bool, CoordinatorError> {
        Ok(self.inner.deps.queue.has(room_id).await?)
    }
}
