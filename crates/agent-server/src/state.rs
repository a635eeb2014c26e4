//! Application State

use std::sync::Arc;

use agent_core::{LlmProvider, Orchestrator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The conversation orchestrator (provider + invoker + limiter)
    pub orchestrator: Arc<Orchestrator>,

    /// Reasoning provider, kept for health checks
    pub provider: Arc<dyn LlmProvider>,
}
