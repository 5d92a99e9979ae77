use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::engine::orchestrator::Orchestrator;
use crate::vault::DocumentVault;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub orchestrator: Orchestrator,
    /// Present when DATABASE_URL is configured.
    pub vault: Option<Arc<dyn DocumentVault>>,
    /// Flips to true on shutdown; in-flight runs use it as their cancellation signal.
    pub shutdown: watch::Receiver<bool>,
}
