//! Application configuration loaded from environment variables and `.env`.

use std::path::PathBuf;

use crate::error::{TabGraphError, TabGraphResult};

/// Application settings.
///
/// API keys are required; everything else has working defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Key for the embedding / LLM provider.
    pub openai_api_key: String,
    /// Key for the search / agent provider.
    pub you_api_key: String,
    /// Key for the alternative metadata provider, if configured.
    pub gemini_api_key: Option<String>,

    pub embedding_model: String,
    pub llm_model: String,
    pub openai_base_url: String,
    pub agent_base_url: String,
    pub search_base_url: String,

    pub db_path: PathBuf,

    /// Which metadata provider to construct: "you", "gemini".
    pub tab_metadata_provider: String,

    pub similarity_threshold: f32,
    pub entity_weight: f32,
    pub rename_threshold: u32,
    pub enrichment_cache_ttl_days: i64,

    /// Disable to keep ingest fully synchronous (no background tasks).
    pub enable_background_enrichment: bool,
}

impl Settings {
    /// Load settings from the process environment, reading `.env` first.
    pub fn from_env() -> TabGraphResult<Self> {
        dotenvy::dotenv().ok();

        let openai_api_key = require("OPENAI_API_KEY")?;
        let you_api_key = require("YOU_API_KEY")?;

        Ok(Self {
            openai_api_key,
            you_api_key,
            gemini_api_key: optional("GEMINI_API_KEY"),
            embedding_model: optional("OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            llm_model: optional("OPENAI_LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            openai_base_url: optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            agent_base_url: optional("AGENT_BASE_URL")
                .unwrap_or_else(|| "https://api.you.com".to_string()),
            search_base_url: optional("SEARCH_BASE_URL")
                .unwrap_or_else(|| "https://api.ydc-index.io".to_string()),
            db_path: optional("TABGRAPH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/knowledge_graph.db")),
            tab_metadata_provider: optional("TAB_METADATA_PROVIDER")
                .unwrap_or_else(|| "you".to_string()),
            similarity_threshold: parse_or("SIMILARITY_THRESHOLD", 0.5)?,
            entity_weight: parse_or("ENTITY_WEIGHT", 0.5)?,
            rename_threshold: parse_or("RENAME_THRESHOLD", 3)?,
            enrichment_cache_ttl_days: parse_or("ENRICHMENT_CACHE_TTL_DAYS", 7)?,
            enable_background_enrichment: parse_or("ENABLE_BACKGROUND_ENRICHMENT", true)?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn require(key: &str) -> TabGraphResult<String> {
    optional(key).ok_or_else(|| TabGraphError::config(format!("{} is not set", key)))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> TabGraphResult<T> {
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| TabGraphError::config(format!("invalid value for {}: {}", key, raw))),
        None => Ok(default),
    }
}
