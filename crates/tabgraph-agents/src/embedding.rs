//! Embedding client.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Expected embedding dimension for text-embedding-3-small.
pub const EMBEDDING_DIM: usize = 1536;

/// Maximum number of inputs the provider accepts per batch call.
pub const MAX_BATCH_SIZE: usize = 2048;

/// Request timeout for embedding calls.
const EMBED_TIMEOUT_SECS: u64 = 30;

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
///
/// Failures are surfaced to the caller; there is no retry at this layer.
#[derive(Clone)]
pub struct EmbeddingClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(EMBED_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        }
    }

    /// Generate an embedding for one text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .context("Embedding response contained no vectors")
    }

    /// Generate embeddings for many texts in one call, in input order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > MAX_BATCH_SIZE {
            anyhow::bail!(
                "Embedding batch of {} exceeds the provider limit of {}",
                texts.len(),
                MAX_BATCH_SIZE
            );
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to reach the embedding provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        if result.data.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: sent {}, received {}",
                texts.len(),
                result.data.len()
            );
        }

        debug!(count = result.data.len(), "Generated embeddings");
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}
