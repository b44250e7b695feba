//! Shared application context.

use std::sync::Arc;

use af_av::Transcoder;
use af_core::config::Config;

use crate::health::HealthMonitor;

/// Application context shared by all request handlers (via Axum state).
///
/// Cheaply cloneable because it only holds `Arc`s. The transcoder sits
/// behind a trait object so tests can substitute in-memory fakes.
#[derive(Clone)]
pub struct AppContext {
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// Spawns one external transcoder per conversion request.
    pub transcoder: Arc<dyn Transcoder>,
    /// Process-wide health monitor queried for admission control.
    pub health: Arc<HealthMonitor>,
}

impl AppContext {
    /// Build a context from a config and transcoder, with a fresh monitor
    /// derived from the config's limits.
    pub fn new(config: Config, transcoder: Arc<dyn Transcoder>) -> Self {
        let health = Arc::new(HealthMonitor::new(&config.limits));
        Self {
            config: Arc::new(config),
            transcoder,
            health,
        }
    }
}
