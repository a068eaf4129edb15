//! Metadata provider backed by the Gemini API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tabgraph_core::TabMetadata;
use tracing::warn;

use crate::metadata::{fallback_metadata, MetadataProvider};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const GEMINI_MODEL: &str = "gemini-1.5-flash";
const GEMINI_TIMEOUT_SECS: u64 = 30;

/// Generates tab metadata with Gemini structured output.
#[derive(Clone)]
pub struct GeminiMetadataProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiMetadataProvider {
    pub fn new(api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(GEMINI_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            api_key: api_key.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            client,
        }
    }

    async fn generate_structured(&self, prompt: &str) -> Result<Value> {
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "response_mime_type": "application/json",
                "response_schema": {
                    "type": "object",
                    "properties": {
                        "label": {"type": "string"},
                        "source": {"type": "string"},
                        "summary": {"type": "string"},
                    },
                    "required": ["label", "source", "summary"],
                },
            },
        });

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                self.base_url, GEMINI_MODEL, self.api_key
            ))
            .json(&body)
            .send()
            .await
            .context("Failed to reach Gemini")?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Gemini API error ({})", status);
        }

        let body: Value = response.json().await.context("Failed to parse Gemini response")?;
        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .context("Gemini response missing text part")?;
        serde_json::from_str(text).context("Gemini text was not valid JSON")
    }
}

#[async_trait]
impl MetadataProvider for GeminiMetadataProvider {
    async fn generate(&self, title: &str, url: &str) -> Result<TabMetadata> {
        let prompt = format!(
            "Generate metadata for this webpage:\n\n\
             Title: {}\nURL: {}\n\n\
             Provide:\n\
             - label: Concise 6-word-max description\n\
             - source: Most relevant attribution (for social/articles use \"Author, Platform\")\n\
             - summary: 2-3 sentence summary",
            title, url
        );

        match self.generate_structured(&prompt).await {
            Ok(data) => {
                let get = |key: &str| {
                    data.get(key)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                let label = get("label");
                let source = get("source");
                if label.is_empty() || source.is_empty() {
                    return Ok(fallback_metadata(title, url));
                }
                Ok(TabMetadata {
                    display_label: format!("{} • {}", label, source),
                    label,
                    source,
                    summary: get("summary"),
                })
            }
            Err(e) => {
                warn!(error = %e, "Gemini metadata generation failed");
                Ok(fallback_metadata(title, url))
            }
        }
    }
}
