//! Chat-completion client for the LLM provider.
//!
//! Used by entity extraction and cluster naming. Supports plain text
//! completions and structured output forced through a JSON schema.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Request timeout for chat completions.
const CHAT_TIMEOUT_SECS: u64 = 30;

/// Chat client for an OpenAI-compatible `/v1/chat/completions` endpoint.
#[derive(Clone)]
pub struct LlmClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl LlmClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(CHAT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        }
    }

    async fn complete(&self, body: Value) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to reach the LLM provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error ({}): {}", status, body);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        debug!(chars = content.len(), "Chat completion received");
        Ok(content)
    }

    /// Plain text completion.
    pub async fn chat(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });
        Ok(self.complete(body).await?.trim().to_string())
    }

    /// Completion forced through a JSON schema (structured output).
    ///
    /// Returns the parsed JSON document; schema adherence failures
    /// surface as errors for the caller's fallback path.
    pub async fn chat_structured(
        &self,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: Value,
        max_tokens: u32,
    ) -> Result<Value> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema_name,
                    "schema": schema,
                    "strict": true,
                },
            },
            "max_tokens": max_tokens,
            "temperature": 0.3,
        });

        let content = self.complete(body).await?;
        serde_json::from_str(&content).context("Structured output was not valid JSON")
    }
}
