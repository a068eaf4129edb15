//! Entity extraction from tab metadata.
//!
//! Tries a structured LLM call first and falls back to keyword
//! extraction from the title and URL, so the result is never empty.

use std::collections::BTreeSet;

use anyhow::Result;
use serde_json::{json, Value};
use tracing::warn;

use crate::llm::LlmClient;

/// Fixed vocabulary recognized in titles and URLs by the fallback path.
const KNOWN_KEYWORDS: &[&str] = &[
    "react", "vue", "angular", "python", "javascript", "typescript",
    "node", "django", "flask", "fastapi", "express",
    "docker", "kubernetes", "aws", "azure", "gcp",
    "mongodb", "postgresql", "mysql", "redis", "neo4j",
    "tensorflow", "pytorch", "ml", "ai", "api", "rest", "graphql",
    "git", "github", "gitlab", "nextjs", "next.js",
    "machine learning", "deep learning", "neural network",
    "database", "graph database", "sql", "nosql", "rust",
];

/// Service extracting 3-8 short topic entities per tab.
#[derive(Clone)]
pub struct EntityExtractor {
    llm: LlmClient,
}

impl EntityExtractor {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Extract entities for one tab. Never fails and never returns empty.
    pub async fn extract(
        &self,
        title: &str,
        url: &str,
        content: Option<&str>,
        max_entities: usize,
    ) -> Vec<String> {
        match self.extract_with_llm(title, url, content, max_entities).await {
            Ok(entities) if !entities.is_empty() => entities,
            Ok(_) => extract_with_keywords(title, url, max_entities),
            Err(e) => {
                warn!(title, error = %e, "LLM extraction failed, falling back to keywords");
                extract_with_keywords(title, url, max_entities)
            }
        }
    }

    /// Extract entities for many tabs in one structured call.
    ///
    /// Results keep input order. A result-count mismatch from the model
    /// drops the whole batch back to per-tab extraction; single-tab
    /// input short-circuits to the scalar path.
    pub async fn extract_batch(
        &self,
        tabs: &[(String, String)],
        max_entities: usize,
    ) -> Vec<Vec<String>> {
        if tabs.is_empty() {
            return Vec::new();
        }
        if tabs.len() == 1 {
            let (title, url) = &tabs[0];
            return vec![self.extract(title, url, None, max_entities).await];
        }

        match self.extract_batch_with_llm(tabs, max_entities).await {
            Ok(entities) => entities,
            Err(e) => {
                warn!(tabs = tabs.len(), error = %e, "Batch extraction failed, extracting per tab");
                let mut results = Vec::with_capacity(tabs.len());
                for (title, url) in tabs {
                    results.push(self.extract(title, url, None, max_entities).await);
                }
                results
            }
        }
    }

    async fn extract_batch_with_llm(
        &self,
        tabs: &[(String, String)],
        max_entities: usize,
    ) -> Result<Vec<Vec<String>>> {
        let tabs_text = tabs
            .iter()
            .enumerate()
            .map(|(i, (title, url))| format!("Tab {}:\nTitle: {}\nURL: {}", i + 1, title, url))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Extract key entities from each tab below. These are important keywords/topics \
             related to the content. Return results in the SAME ORDER.\n\n{}\n\n\
             For EACH tab, extract 3-{} key entities. These can be:\n\
             - Main topics (e.g., \"Photosynthesis\", \"French Revolution\", \"React\")\n\
             - Key concepts (e.g., \"Democracy\", \"Machine Learning\", \"Gene Editing\")\n\
             - Important people, places, organizations (e.g., \"Marie Curie\", \"Paris\", \"NASA\")\n\
             - Specific subjects (e.g., \"World War II\", \"JavaScript\", \"Climate Change\")\n\n\
             Extract entities relevant to ANY domain (history, science, tech, business, etc.).\n\
             IMPORTANT: Maintain the exact order of tabs in your response.",
            tabs_text, max_entities
        );

        let schema = json!({
            "type": "object",
            "properties": {
                "results": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "entities": {
                                "type": "array",
                                "items": {"type": "string"},
                                "minItems": 2,
                                "maxItems": max_entities,
                            }
                        },
                        "required": ["entities"],
                        "additionalProperties": false,
                    }
                }
            },
            "required": ["results"],
            "additionalProperties": false,
        });

        let response = self
            .llm
            .chat_structured(
                "You are an expert at extracting key topics and concepts. Extract entities \
                 relevant to the domain (tech, science, history, business, etc.) and maintain \
                 their order.",
                &prompt,
                "batch_entity_extraction",
                schema,
                100 * tabs.len() as u32,
            )
            .await?;

        let results = response
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow::anyhow!("response missing results array"))?;

        if results.len() != tabs.len() {
            anyhow::bail!("expected {} results but got {}", tabs.len(), results.len());
        }

        Ok(results
            .iter()
            .map(|item| {
                item.get("entities")
                    .and_then(Value::as_array)
                    .map(|entities| {
                        entities
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect())
    }

    async fn extract_with_llm(
        &self,
        title: &str,
        url: &str,
        content: Option<&str>,
        max_entities: usize,
    ) -> Result<Vec<String>> {
        let mut context = format!("Title: {}\nURL: {}", title, url);
        if let Some(snippet) = content {
            let truncated: String = snippet.chars().take(500).collect();
            context.push_str(&format!("\nContent: {}", truncated));
        }

        let prompt = format!(
            "Extract the most important keywords and topics from this content.\n\n{}\n\n\
             Return 3-{} key entities as a comma-separated list. These can be:\n\
             - Main topics (e.g., \"Photosynthesis\", \"French Revolution\", \"React\")\n\
             - Key concepts (e.g., \"Democracy\", \"Machine Learning\", \"CRISPR\")\n\
             - Important subjects (e.g., \"World War II\", \"JavaScript\", \"Climate Change\")\n\n\
             Extract entities relevant to ANY domain, not just technology.\n\
             Return ONLY the entity names, comma-separated, nothing else.",
            context, max_entities
        );

        let response = self
            .llm
            .chat(
                "You are an expert at extracting key topics and concepts. Return only entity \
                 names, comma-separated.",
                &prompt,
                100,
                0.3,
            )
            .await?;

        Ok(response
            .split(',')
            .map(str::trim)
            .filter(|e| e.len() > 1 && e.len() < 50)
            .map(str::to_string)
            .take(max_entities)
            .collect())
    }
}

/// Keyword-based fallback extraction from title and URL.
pub fn extract_with_keywords(title: &str, url: &str, max_entities: usize) -> Vec<String> {
    let mut entities = BTreeSet::new();

    // Capitalized words in the title are likely proper nouns.
    for word in title.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if cleaned.len() > 2 {
            let known = KNOWN_KEYWORDS.contains(&cleaned.to_lowercase().as_str());
            if cleaned.chars().next().is_some_and(char::is_uppercase) || known {
                entities.insert(cleaned);
            }
        }
    }

    let url_lower = url.to_lowercase();
    for keyword in KNOWN_KEYWORDS {
        if url_lower.contains(keyword) {
            entities.insert(title_case(keyword));
        }
    }

    if let Some(domain) = registrable_domain(url) {
        if domain.len() > 2 {
            entities.insert(title_case(&domain));
        }
    }

    let mut result: Vec<String> = entities.into_iter().take(max_entities).collect();

    // Last resort so the result is never empty.
    if result.is_empty() {
        let fallback = registrable_domain(url)
            .map(|d| title_case(&d))
            .or_else(|| title.split_whitespace().next().map(str::to_string))
            .unwrap_or_else(|| "Unknown".to_string());
        result.push(fallback);
    }

    result
}

/// First label of the URL's host, `www.` stripped.
fn registrable_domain(url: &str) -> Option<String> {
    let rest = url.split("://").nth(1)?;
    let host = rest.split('/').next()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    host.split('.').next().map(str::to_string).filter(|s| !s.is_empty())
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
