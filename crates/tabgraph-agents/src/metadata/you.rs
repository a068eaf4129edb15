//! Metadata provider backed by the express agent.

use async_trait::async_trait;
use serde_json::Value;
use tabgraph_core::TabMetadata;
use tracing::warn;

use crate::agent_client::AgentClient;
use crate::metadata::{extract_domain, fallback_metadata, MetadataProvider};

/// Generates tab metadata through the agent provider.
#[derive(Clone)]
pub struct YouMetadataProvider {
    agent: AgentClient,
}

impl YouMetadataProvider {
    pub fn new(agent: AgentClient) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl MetadataProvider for YouMetadataProvider {
    async fn generate(&self, title: &str, url: &str) -> anyhow::Result<TabMetadata> {
        let prompt = format!(
            "Generate metadata for this webpage:\n\n\
             Title: {}\nURL: {}\n\n\
             Respond with ONLY this JSON (no other text):\n\
             {{\n\
             \x20 \"label\": \"concise 6-word-max description\",\n\
             \x20 \"source\": \"author/org/site (use 'Author, Publication' for articles/social media)\",\n\
             \x20 \"summary\": \"2-3 sentence summary\"\n\
             }}",
            title, url
        );

        let answer = self.agent.express_agent(&prompt).await?;

        match extract_json(&answer).and_then(|data| format_metadata(&data, url)) {
            Some(metadata) => Ok(metadata),
            None => {
                warn!(title, "Could not parse metadata response");
                Ok(fallback_metadata(title, url))
            }
        }
    }
}

/// Extract a JSON object from a possibly noisy answer.
fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    // The answer may wrap the JSON in prose; take the outermost braces.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn format_metadata(data: &Value, url: &str) -> Option<TabMetadata> {
    let object = data.as_object()?;
    if !object.contains_key("label") || !object.contains_key("source") || !object.contains_key("summary")
    {
        return None;
    }

    let clamp = |key: &str, max: usize| -> String {
        object
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .chars()
            .take(max)
            .collect()
    };

    let mut label = clamp("label", 60);
    let mut source = clamp("source", 100);
    let summary = clamp("summary", 500);

    if source.is_empty() {
        source = extract_domain(url);
    }
    if label.is_empty() {
        label = "Untitled Page".to_string();
    }

    Some(TabMetadata {
        display_label: format!("{} • {}", label, source),
        label,
        source,
        summary,
    })
}
