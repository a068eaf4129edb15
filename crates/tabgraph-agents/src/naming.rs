//! LLM-backed cluster naming.

use anyhow::Result;
use serde_json::{json, Value};

use crate::llm::LlmClient;

/// Titles and shared entities describing one cluster to be named.
#[derive(Debug, Clone)]
pub struct NamingRequest {
    pub titles: Vec<String>,
    pub entities: Vec<String>,
}

/// Generates 1-3 word category names for tab clusters.
#[derive(Clone)]
pub struct ClusterNamer {
    llm: LlmClient,
}

impl ClusterNamer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Name one cluster from sample titles and top shared entities.
    pub async fn name_cluster(&self, request: &NamingRequest) -> Result<String> {
        let response = self
            .llm
            .chat("", &naming_prompt(request), 20, 0.3)
            .await?;

        let name = response.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
        if name.is_empty() {
            anyhow::bail!("empty cluster name from model");
        }
        Ok(name)
    }

    /// Name several clusters in one structured call.
    ///
    /// The model must return exactly one name per cluster; a length
    /// mismatch is an error so the caller can fall back to per-cluster
    /// naming.
    pub async fn name_clusters_batch(&self, requests: &[NamingRequest]) -> Result<Vec<String>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let clusters_text = requests
            .iter()
            .enumerate()
            .map(|(i, request)| {
                format!(
                    "Cluster {}:\nTab titles:\n{}\nCommon entities: {}",
                    i + 1,
                    request
                        .titles
                        .iter()
                        .map(|t| format!("- {}", t))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    if request.entities.is_empty() {
                        "None".to_string()
                    } else {
                        request.entities.join(", ")
                    }
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "You are naming browser tab groups. For each cluster below, generate a broad, \
             general category name (1-3 words, title case) that captures the overarching \
             theme. Return one name per cluster, in the same order.\n\n{}",
            clusters_text
        );

        let schema = json!({
            "type": "object",
            "properties": {
                "names": {
                    "type": "array",
                    "items": {"type": "string"},
                }
            },
            "required": ["names"],
            "additionalProperties": false,
        });

        let response = self
            .llm
            .chat_structured("", &prompt, "batch_cluster_naming", schema, 20 * requests.len() as u32)
            .await?;

        let names: Vec<String> = response
            .get("names")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if names.len() != requests.len() {
            anyhow::bail!("expected {} names but got {}", requests.len(), names.len());
        }
        Ok(names)
    }
}

fn naming_prompt(request: &NamingRequest) -> String {
    let titles = request
        .titles
        .iter()
        .map(|t| format!("- {}", t))
        .collect::<Vec<_>>()
        .join("\n");
    let entities = if request.entities.is_empty() {
        "None".to_string()
    } else {
        request
            .entities
            .iter()
            .map(|e| format!("- {}", e))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are naming a browser tab group. Generate a broad, general category name \
         (1-3 words) that captures the overarching theme.\n\n\
         Tab titles in this group:\n{}\n\n\
         Common entities:\n{}\n\n\
         Rules:\n\
         - Use 1-3 words maximum\n\
         - Be GENERAL and BROAD - think high-level categories\n\
         - Prefer single-word or two-word labels when possible\n\
         - Avoid overly specific details\n\
         - Use title case\n\n\
         Examples:\n\
         - \"Development\" (not \"React Development\")\n\
         - \"Databases\" (not \"Graph Database Research\")\n\
         - \"Machine Learning\" (not \"ML Papers on Transformers\")\n\
         - \"Documentation\" (not \"API Documentation\")\n\
         - \"Research\" (not \"Academic Paper Review\")\n\n\
         Generate the name (no quotes, just the name):",
        titles, entities
    )
}
