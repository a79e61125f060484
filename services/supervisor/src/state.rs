//! Application state shared across request handlers.

use std::sync::Arc;

use crate::coordinator::DeployCoordinator;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    coordinator: DeployCoordinator,
}

impl AppState {
    pub fn new(coordinator: DeployCoordinator) -> Self {
        Self {
            inner: Arc::new(AppStateInner { coordinator }),
        }
    }

    pub fn coordinator(&self) -> &DeployCoordinator {
        &self.inner.coordinator
    }
}
