//! The three-step provisioning pipeline.
//!
//! Steps run in order and stop at the first failure:
//! 1. Create the room's relay stream
//! 2. Point the room's clients at the relay node
//! 3. Provision the compute unit
//!
//! Nothing is rolled back. The error names the failed step and every step
//! whose side effect is still in place.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use roomvisor_model::{Region, RoomId};
use thiserror::Error;
use tracing::{debug, warn};

use super::Deadline;
use crate::adapters::{AdapterError, CurrentItem, PresenceService, StreamHandle, StreamService};
use crate::capacity::{CapacityError, CapacityProvider};

/// A pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    CreateStream,
    SetCurrentItem,
    DeployUnit,
}

impl ProvisionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateStream => "create_stream",
            Self::SetCurrentItem => "set_current_item",
            Self::DeployUnit => "deploy_unit",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a step failed.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error("no answer within {0:?}")]
    DeadlineExceeded(Duration),
}

/// A pipeline run that stopped part way.
#[derive(Debug, Error)]
#[error("provisioning room {room_id} failed at {step}{}: {cause}", left_in_place(.completed))]
pub struct ProvisionError {
    pub room_id: RoomId,
    pub step: ProvisionStep,
    /// Steps that succeeded before the failure and were not undone.
    pub completed: Vec<ProvisionStep>,
    #[source]
    pub cause: StepFailure,
}

impl ProvisionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, StepFailure::DeadlineExceeded(_))
    }

    /// Whether the compute unit already existed.
    pub fn is_duplicate(&self) -> bool {
        matches!(self.cause, StepFailure::Capacity(CapacityError::AlreadyExists(_)))
    }
}

fn left_in_place(completed: &[ProvisionStep]) -> String {
    if completed.is_empty() {
        return String::new();
    }
    let steps: Vec<&str> = completed.iter().map(ProvisionStep::as_str).collect();
    format!(" (left in place: {})", steps.join(", "))
}

/// Collaborators and limits for one pipeline run.
pub(crate) struct Pipeline<'a> {
    pub streams: &'a dyn StreamService,
    pub presence: &'a dyn PresenceService,
    pub capacity: &'a dyn CapacityProvider,
    pub call_timeout: Duration,
}

struct Progress {
    room_id: RoomId,
    completed: Vec<ProvisionStep>,
}

impl Progress {
    fn fail(self, step: ProvisionStep, cause: StepFailure) -> ProvisionError {
        if !self.completed.is_empty() {
            warn!(
                room_id = %self.room_id,
                failed_step = %step,
                left_in_place = ?self.completed,
                error = %cause,
                "Provisioning stopped part way"
            );
        }
        ProvisionError {
            room_id: self.room_id,
            step,
            completed: self.completed,
            cause,
        }
    }
}

impl Pipeline<'_> {
    async fn step<T, E, F>(
        &self,
        deadline: &Deadline,
        step: ProvisionStep,
        call: F,
    ) -> Result<T, StepFailure>
    where
        F: Future<Output = Result<T, E>>,
        StepFailure: From<E>,
    {
        let budget = deadline.budget(self.call_timeout);
        match tokio::time::timeout(budget, call).await {
            Ok(result) => {
                let value = result?;
                debug!(%step, "Provision step complete");
                Ok(value)
            }
            Err(_) => Err(StepFailure::DeadlineExceeded(budget)),
        }
    }

    /// Runs every step for the room.
    pub async fn run(
        &self,
        room_id: RoomId,
        region: Region,
        deadline: &Deadline,
    ) -> Result<StreamHandle, ProvisionError> {
        let mut progress = Progress {
            room_id,
            completed: Vec::with_capacity(3),
        };

        let name = room_id.to_string();
        let handle = match self
            .step(deadline, ProvisionStep::CreateStream, self.streams.create_stream(&name))
            .await
        {
            Ok(handle) => handle,
            Err(cause) => return Err(progress.fail(ProvisionStep::CreateStream, cause)),
        };
        progress.completed.push(ProvisionStep::CreateStream);

        let item = CurrentItem::relay(handle.node_id.clone());
        if let Err(cause) = self
            .step(
                deadline,
                ProvisionStep::SetCurrentItem,
                self.presence.set_current_item(room_id, item),
            )
            .await
        {
            return Err(progress.fail(ProvisionStep::SetCurrentItem, cause));
        }
        progress.completed.push(ProvisionStep::SetCurrentItem);

        if let Err(cause) = self
            .step(
                deadline,
                ProvisionStep::DeployUnit,
                self.capacity.deploy(room_id, region),
            )
            .await
        {
            return Err(progress.fail(ProvisionStep::DeployUnit, cause));
        }

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_lists_steps_left_in_place() {
        let err = ProvisionError {
            room_id: RoomId::new(5),
            step: ProvisionStep::DeployUnit,
            completed: vec![ProvisionStep::CreateStream, ProvisionStep::SetCurrentItem],
            cause: StepFailure::Capacity(CapacityError::BackendUnavailable("down".into())),
        };
        assert_eq!(
            err.to_string(),
            "provisioning room 5 failed at deploy_unit (left in place: create_stream, \
             set_current_item): capacity backend unavailable: down"
        );
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_first_step_failure_has_nothing_left() {
        let err = ProvisionError {
            room_id: RoomId::new(5),
            step: ProvisionStep::CreateStream,
            completed: Vec::new(),
            cause: StepFailure::DeadlineExceeded(Duration::from_secs(1)),
        };
        assert_eq!(
            err.to_string(),
            "provisioning room 5 failed at create_stream: no answer within 1s"
        );
        assert!(err.is_timeout());
    }
}
