//! Request deadlines.

use std::time::Duration;

use tokio::time::Instant;

/// Point in time after which work on a request is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Time one call may take: the remaining budget, capped at `per_call`.
    pub fn budget(&self, per_call: Duration) -> Duration {
        self.remaining().min(per_call)
    }
}
