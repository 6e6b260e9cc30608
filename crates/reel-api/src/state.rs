//! Application state.

use std::sync::Arc;

use reel_queue::{JobStatusStore, WorkQueue};
use reel_storage::{ArtifactDelivery, LocalVideoStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn JobStatusStore>,
    pub queue: Arc<dyn WorkQueue>,
    /// Directory served under `/videos`
    pub videos: LocalVideoStore,
    /// Backend the worker delivers to; checked by `/ready`
    pub delivery: Arc<dyn ArtifactDelivery>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        store: Arc<dyn JobStatusStore>,
        queue: Arc<dyn WorkQueue>,
        videos: LocalVideoStore,
        delivery: Arc<dyn ArtifactDelivery>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            videos,
            delivery,
        }
    }
}
