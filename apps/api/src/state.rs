use std::sync::Arc;

use crate::interview::registry::SessionRegistry;
use crate::interview::session::{InterviewSettings, PhaseHandoff};
use crate::llm_client::StreamingTextSource;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    /// Streaming source shared by every session. `LlmClient` in production.
    pub source: Arc<dyn StreamingTextSource>,
    pub handoff: Arc<dyn PhaseHandoff>,
    pub settings: InterviewSettings,
}
