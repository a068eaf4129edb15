//! Entity enrichment via the express agent.
//!
//! Produces a type, a short description and related entity names for a
//! given entity, optionally grounded in the context of one tab so that
//! the same name can mean different things on different pages.

use tabgraph_core::ENTITY_TYPES;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;
use tracing::{debug, warn};

use crate::agent_client::AgentClient;

/// Maximum stored description length.
const MAX_DESCRIPTION_CHARS: usize = 300;

/// Maximum related entities kept per enrichment.
const MAX_RELATED: usize = 5;

/// Retry attempts for a single enrichment.
const RETRY_ATTEMPTS: usize = 3;

/// Tab context handed to the agent for context-aware descriptions.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentContext {
    pub tab_id: Option<i64>,
    pub tab_url: Option<String>,
    pub tab_title: Option<String>,
    pub tab_summary: Option<String>,
    pub related_entities: Vec<String>,
}

impl EnrichmentContext {
    fn is_empty(&self) -> bool {
        self.tab_url.is_none()
            && self.tab_title.is_none()
            && self.tab_summary.is_none()
            && self.related_entities.is_empty()
    }
}

/// Enrichment result. `is_enriched` is false when the agent produced no
/// usable description.
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub name: String,
    pub description: Option<String>,
    pub entity_type: String,
    pub related_concepts: Vec<String>,
    pub source_url: Option<String>,
    pub is_enriched: bool,
    pub tab_id: Option<i64>,
}

impl Enrichment {
    fn empty(name: &str, tab_id: Option<i64>) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            entity_type: "other".to_string(),
            related_concepts: Vec::new(),
            source_url: None,
            is_enriched: false,
            tab_id,
        }
    }
}

/// Service enriching entities with agent-sourced descriptions.
#[derive(Clone)]
pub struct EntityEnricher {
    agent: AgentClient,
}

impl EntityEnricher {
    pub fn new(agent: AgentClient) -> Self {
        Self { agent }
    }

    /// Enrich one entity, optionally in the context of a tab.
    ///
    /// Transient failures are retried with exponential backoff; the
    /// caller never sees an error, only an empty record.
    pub async fn enrich(&self, name: &str, context: Option<&EnrichmentContext>) -> Enrichment {
        let tab_id = context.and_then(|c| c.tab_id);
        let prompt = build_prompt(name, context);

        let strategy = ExponentialBackoff::from_millis(1000)
            .max_delay(std::time::Duration::from_secs(10))
            .take(RETRY_ATTEMPTS - 1);

        let response = Retry::spawn(strategy, || self.agent.express_agent(&prompt)).await;

        match response {
            Ok(text) => match parse_response(name, &text, tab_id) {
                Some(enrichment) => {
                    debug!(entity = name, "Enriched entity");
                    enrichment
                }
                None => Enrichment::empty(name, tab_id),
            },
            Err(e) => {
                warn!(entity = name, error = %e, "Enrichment failed after retries");
                Enrichment::empty(name, tab_id)
            }
        }
    }
}

fn build_prompt(name: &str, context: Option<&EnrichmentContext>) -> String {
    let type_choices = ENTITY_TYPES.join(", ");
    let format_hint = "Format your response as:\n\
         Type: [type]\n\
         Description: [description]\n\
         Related: [entity1, entity2, entity3]";

    match context.filter(|c| !c.is_empty()) {
        Some(ctx) => {
            let mut parts = Vec::new();
            if let Some(url) = &ctx.tab_url {
                parts.push(format!("URL: {}", url));
            }
            if !ctx.related_entities.is_empty() {
                let related: Vec<&str> = ctx
                    .related_entities
                    .iter()
                    .take(MAX_RELATED)
                    .map(String::as_str)
                    .collect();
                parts.push(format!("Related concepts: {}", related.join(", ")));
            }
            if let Some(summary) = &ctx.tab_summary {
                parts.push(format!("Page summary: {}", summary));
            } else if let Some(title) = &ctx.tab_title {
                parts.push(format!("Page title: {}", title));
            }

            format!(
                "Provide information about \"{}\" in the context of this webpage:\n\n{}\n\n\
                 Include:\n\
                 1. Entity Type: Choose ONE from [{}]\n\
                 2. Description: 2-3 sentences explaining what it is IN THIS SPECIFIC CONTEXT\n\
                 3. Related Entities: List 3-5 related entities from this domain\n\n{}",
                name,
                parts.join("\n"),
                type_choices,
                format_hint
            )
        }
        None => format!(
            "Provide information about \"{}\". Include:\n\
             1. Entity Type: Choose ONE from [{}]\n\
             2. Description: 2-3 sentences explaining what it is\n\
             3. Related Entities: List 3-5 related entities or concepts (can be from any domain)\n\n{}",
            name, type_choices, format_hint
        ),
    }
}

/// Lenient parse of the `Type: / Description: / Related:` response form.
///
/// Returns `None` when no description could be recovered.
fn parse_response(name: &str, text: &str, tab_id: Option<i64>) -> Option<Enrichment> {
    let mut entity_type = "other".to_string();
    let mut description = String::new();
    let mut related = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Type:") {
            let cleaned = rest.trim().trim_matches(|c| c == '[' || c == ']').to_lowercase();
            if !cleaned.is_empty() {
                entity_type = cleaned;
            }
        } else if let Some(rest) = line.strip_prefix("Description:") {
            description = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("Related:") {
            related = rest
                .trim()
                .trim_matches(|c| c == '[' || c == ']')
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .take(MAX_RELATED)
                .collect();
        }
    }

    if description.is_empty() {
        return None;
    }
    description.truncate(
        description
            .char_indices()
            .nth(MAX_DESCRIPTION_CHARS)
            .map(|(i, _)| i)
            .unwrap_or(description.len()),
    );

    Some(Enrichment {
        name: name.to_string(),
        description: Some(description),
        entity_type,
        related_concepts: related,
        source_url: None,
        is_enriched: true,
        tab_id,
    })
}
