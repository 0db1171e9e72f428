use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bot_metrics::MetricsService;

/// Readiness flag shared between the bot lifecycle and the health server.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsService>,
    pub readiness: Readiness,
}

impl AppState {
    pub fn new(metrics: Arc<MetricsService>, readiness: Readiness) -> Self {
        Self { metrics, readiness }
    }
}
