//! Shared application state

use prism::{AttachmentStore, FanOutOrchestrator, PrismConfig};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<FanOutOrchestrator>,
    pub store: Arc<AttachmentStore>,
    pub config: Arc<PrismConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<FanOutOrchestrator>,
        store: Arc<AttachmentStore>,
        config: PrismConfig,
    ) -> Self {
        Self {
            orchestrator,
            store,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
