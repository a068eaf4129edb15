//! Domain models for tabs, entities and the knowledge graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of entity types the enrichment agent may assign.
///
/// Stored as free strings in the graph so that legacy tags
/// (e.g. "Framework") survive round-trips.
pub const ENTITY_TYPES: [&str; 11] = [
    "concept",
    "tool",
    "person",
    "organization",
    "method",
    "resource",
    "topic",
    "standard",
    "event",
    "location",
    "other",
];

/// A browser tab with its metadata and embedding.
///
/// The id is assigned by the browser and is unique across the live tab
/// set. Tabs are created on first appearance in an ingest, updated on
/// later appearances, marked inactive by reconciliation and hard-deleted
/// only on explicit request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tab {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub favicon_url: Option<String>,
    pub summary: Option<String>,
    pub label: Option<String>,
    pub source: Option<String>,
    pub display_label: Option<String>,
    /// Entities extracted from the tab, ordered for presentation.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Embedding of `title + " " + url`.
    pub embedding: Option<Vec<f32>>,
    pub opened_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub window_id: Option<i64>,
    pub group_id: Option<i64>,
    pub is_active: bool,
    #[serde(default)]
    pub important: bool,
}

impl Tab {
    /// Create a tab with the minimum caller-supplied fields.
    pub fn new(id: i64, url: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            url: url.into(),
            title: title.into(),
            favicon_url: None,
            summary: None,
            label: None,
            source: None,
            display_label: None,
            entities: Vec::new(),
            embedding: None,
            opened_at: now,
            last_accessed: now,
            closed_at: None,
            window_id: None,
            group_id: None,
            is_active: true,
            important: false,
        }
    }

    /// Text used for embedding generation.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.title, self.url)
    }
}

/// An entity in the knowledge graph, unique by `(name, entity_type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Option<i64>,
    pub name: String,
    pub entity_type: String,
    pub description: Option<String>,
    /// Global description written by the enrichment agent.
    pub web_description: Option<String>,
    #[serde(default)]
    pub related_concepts: Vec<String>,
    pub source_url: Option<String>,
    pub is_enriched: bool,
    pub enriched_at: Option<DateTime<Utc>>,
    /// Embedding of the entity name, used for cluster centroids.
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    /// Create an un-enriched entity with the default `concept` type.
    pub fn concept(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            entity_type: "concept".to_string(),
            description: None,
            web_description: None,
            related_concepts: Vec::new(),
            source_url: None,
            is_enriched: false,
            enriched_at: None,
            embedding: None,
            created_at: Utc::now(),
        }
    }

    /// Whether this entity needs (re-)enrichment under the cache TTL rule.
    pub fn needs_enrichment(&self, cache_ttl_days: i64, now: DateTime<Utc>) -> bool {
        if !self.is_enriched {
            return true;
        }
        match self.enriched_at {
            None => true,
            Some(at) => now - at > chrono::Duration::days(cache_ttl_days),
        }
    }
}

/// Temporal validity window of a triplet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalValidity {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_current: bool,
}

impl Default for TemporalValidity {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            is_current: true,
        }
    }
}

impl TemporalValidity {
    /// Whether the window contains the given instant.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_time.map_or(true, |s| s <= at) && self.end_time.map_or(true, |e| e >= at)
    }
}

/// A subject-predicate-object relationship between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Triplet {
    pub id: Option<i64>,
    pub subject_id: i64,
    pub subject_name: String,
    pub predicate: String,
    pub object_id: i64,
    pub object_name: String,
    pub temporal_validity: TemporalValidity,
    pub confidence: f64,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-tab metadata produced by a metadata provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabMetadata {
    /// Concise description, at most six words.
    pub label: String,
    /// Author, organization or site name.
    pub source: String,
    /// 2-3 sentence summary.
    pub summary: String,
    /// Formatted `"{label} • {source}"`.
    pub display_label: String,
}

/// A materialized undirected tab-tab edge, canonical `tab_id_low < tab_id_high`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabEdge {
    pub tab_id_low: i64,
    pub tab_id_high: i64,
    pub shared_entities: Vec<String>,
    pub shared_entity_count: i64,
    /// Jaccard strength over the two tabs' entity sets.
    pub strength: f64,
    pub first_connected: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// A tab-tab edge viewed from one endpoint, with the related tab resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabRelationship {
    pub related_tab_id: i64,
    pub related_tab_title: String,
    pub related_tab_url: String,
    pub shared_entities: Vec<String>,
    pub shared_entity_count: i64,
    pub strength: f64,
    pub first_connected: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}
