//! Application state shared across handlers.

use std::sync::Arc;

use tabgraph_agents::AgentClient;
use tabgraph_cluster::IngestPipeline;
use tabgraph_core::Settings;

/// Shared state: the pipeline wraps the engine lock and the store; the
/// agent client serves the recommendations pass-through.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub agent: AgentClient,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(pipeline: Arc<IngestPipeline>, agent: AgentClient, settings: Settings) -> Self {
        Self {
            pipeline,
            agent,
            settings: Arc::new(settings),
        }
    }
}
