//! Search / agent provider client.
//!
//! Two endpoints with different auth: the agent runs API takes a Bearer
//! token and may reason for a while, the plain web-search API takes an
//! X-API-Key header.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

/// Agent runs can take multi-step reasoning time.
const AGENT_TIMEOUT_SECS: u64 = 60;

/// Plain search is a single round trip.
const SEARCH_TIMEOUT_SECS: u64 = 30;

/// One hit from the web-search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Client for the express-agent and web-search collaborator.
#[derive(Clone)]
pub struct AgentClient {
    agent_base_url: String,
    search_base_url: String,
    api_key: String,
    agent_client: reqwest::Client,
    search_client: reqwest::Client,
}

impl AgentClient {
    pub fn new(agent_base_url: &str, search_base_url: &str, api_key: &str) -> Self {
        let agent_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(AGENT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        let search_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            agent_base_url: agent_base_url.trim_end_matches('/').to_string(),
            search_base_url: search_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            agent_client,
            search_client,
        }
    }

    /// Run the express agent and return its answer text.
    ///
    /// The response carries a list of typed output items; the answer is
    /// the first `message.answer` or `chat_node.answer` item. An answer
    /// may legitimately be empty.
    pub async fn express_agent(&self, input: &str) -> Result<String> {
        let payload = json!({
            "agent": "express",
            "input": input,
            "stream": false,
        });

        let response = self
            .agent_client
            .post(format!("{}/v1/agents/runs", self.agent_base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach the agent provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Agent API error ({}): {}", status, body);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse agent response")?;

        Ok(extract_answer(&body))
    }

    /// Plain web search.
    pub async fn search(&self, query: &str, num_results: u32) -> Result<Vec<SearchResult>> {
        let num_results = num_results.to_string();
        let response = self
            .search_client
            .get(format!("{}/search", self.search_base_url))
            .header("X-API-Key", &self.api_key)
            .query(&[("query", query), ("num_web_results", num_results.as_str())])
            .send()
            .await
            .context("Failed to reach the search provider")?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Search API error ({})", status);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse search response")?;

        let hits = body
            .get("hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(hits
            .iter()
            .map(|hit| SearchResult {
                title: str_field(hit, "title"),
                url: str_field(hit, "url"),
                snippet: str_field(hit, "description"),
            })
            .collect())
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Pull the answer text out of an agent run response.
pub(crate) fn extract_answer(body: &Value) -> String {
    body.get("output")
        .and_then(Value::as_array)
        .and_then(|items| {
            items.iter().find(|item| {
                matches!(
                    item.get("type").and_then(Value::as_str),
                    Some("message.answer") | Some("chat_node.answer")
                )
            })
        })
        .and_then(|item| item.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
