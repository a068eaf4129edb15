//! Tab metadata generation with a pluggable provider.

use std::sync::Arc;

use tabgraph_core::{Settings, TabMetadata};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;
use tracing::warn;

use crate::agent_client::AgentClient;
use crate::metadata::gemini::GeminiMetadataProvider;
use crate::metadata::you::YouMetadataProvider;
use crate::metadata::MetadataProvider;

/// Fewer retries than enrichment: a tab can exist without metadata.
const RETRY_ATTEMPTS: usize = 2;

/// Build the configured metadata provider.
///
/// Unknown provider names and a missing Gemini key fall back to the
/// agent-backed provider with a warning.
pub fn provider_from_settings(settings: &Settings, agent: AgentClient) -> Arc<dyn MetadataProvider> {
    match settings.tab_metadata_provider.to_lowercase().as_str() {
        "you" => Arc::new(YouMetadataProvider::new(agent)),
        "gemini" => match &settings.gemini_api_key {
            Some(key) => Arc::new(GeminiMetadataProvider::new(key)),
            None => {
                warn!("GEMINI_API_KEY not set, falling back to the agent provider");
                Arc::new(YouMetadataProvider::new(agent))
            }
        },
        other => {
            warn!(provider = other, "Unknown metadata provider, using the agent provider");
            Arc::new(YouMetadataProvider::new(agent))
        }
    }
}

/// Service generating tab metadata through the configured provider.
#[derive(Clone)]
pub struct TabSummarizer {
    provider: Arc<dyn MetadataProvider>,
}

impl TabSummarizer {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self { provider }
    }

    /// Generate metadata for a tab, or `None` when every attempt fails.
    pub async fn summarize(&self, title: &str, url: &str) -> Option<TabMetadata> {
        let strategy = ExponentialBackoff::from_millis(1000)
            .max_delay(std::time::Duration::from_secs(5))
            .take(RETRY_ATTEMPTS - 1);

        match Retry::spawn(strategy, || self.provider.generate(title, url)).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(title, error = %e, "Metadata generation failed");
                None
            }
        }
    }
}
