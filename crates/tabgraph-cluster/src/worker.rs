//! Background enrichment worker.
//!
//! Runs off the request path with its own database connection and HTTP
//! clients. Per-name failures are logged and skipped; nothing here ever
//! reports an error upstream.

use chrono::Utc;
use tabgraph_agents::{AgentClient, EmbeddingClient, EnrichmentContext, EntityEnricher};
use tabgraph_core::{Entity, Settings, Tab};
use tabgraph_db::queries::{contexts, entities, links};
use tabgraph_db::DbPool;
use tracing::{debug, info, warn};

/// Fire-and-forget enrichment of entity names collected during an ingest.
pub struct EnrichmentWorker;

impl EnrichmentWorker {
    /// Schedule enrichment of the given names in the background.
    pub fn spawn(settings: Settings, entity_names: Vec<String>) {
        if entity_names.is_empty() {
            return;
        }
        tokio::spawn(async move {
            Self::run(settings, entity_names).await;
        });
    }

    /// Enrich the given names: write per-(entity, tab) contexts plus the
    /// global entity fields, then embed the names for entity-based
    /// centroids.
    pub async fn run(settings: Settings, entity_names: Vec<String>) {
        let Some((pool, enricher, embedder)) = Self::open_resources(&settings) else {
            return;
        };

        // Only names whose stored entity still needs work under the TTL rule.
        let stored = match entities::get_by_names(&pool, &entity_names) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Enrichment status fetch failed");
                return;
            }
        };
        let now = Utc::now();
        let pending: Vec<Entity> = stored
            .into_iter()
            .filter(|entity| entity.needs_enrichment(settings.enrichment_cache_ttl_days, now))
            .collect();
        if pending.is_empty() {
            debug!("No entities need enrichment");
            return;
        }
        info!(count = pending.len(), "Enriching entities in background");

        let mut enriched: Vec<(i64, String)> = Vec::new();
        for entity in &pending {
            let Some(entity_id) = entity.id else { continue };
            let representative = links::tabs_for_entity(&pool, entity_id)
                .ok()
                .and_then(|tabs| tabs.into_iter().next());

            Self::enrich_one(&pool, &enricher, entity_id, &entity.name, representative.as_ref())
                .await;
            enriched.push((entity_id, entity.name.clone()));
        }

        // Embed the names so subsequent centroids can use them.
        let names: Vec<String> = enriched.iter().map(|(_, name)| name.clone()).collect();
        match embedder.embed_batch(&names).await {
            Ok(embeddings) => {
                for ((entity_id, name), embedding) in enriched.iter().zip(embeddings) {
                    if let Err(e) = entities::update_embedding(&pool, *entity_id, &embedding) {
                        warn!(entity = %name, error = %e, "Embedding write failed");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Entity name embedding failed"),
        }
    }

    /// Schedule context enrichment for explicit `(entity, tab)` pairs,
    /// as requested by the re-enrich endpoint.
    pub fn spawn_pairs(settings: Settings, pairs: Vec<(i64, i64)>) {
        if pairs.is_empty() {
            return;
        }
        tokio::spawn(async move {
            Self::run_pairs(settings, pairs).await;
        });
    }

    /// Enrich explicit `(entity_id, tab_id)` pairs.
    pub async fn run_pairs(settings: Settings, pairs: Vec<(i64, i64)>) {
        let Some((pool, enricher, _)) = Self::open_resources(&settings) else {
            return;
        };
        info!(count = pairs.len(), "Re-enriching entity-tab pairs");

        for (entity_id, tab_id) in pairs {
            let entity = match entities::get(&pool, entity_id) {
                Ok(Some(entity)) => entity,
                Ok(None) => continue,
                Err(e) => {
                    warn!(entity_id, error = %e, "Entity fetch failed");
                    continue;
                }
            };
            let tab = match tabgraph_db::queries::tabs::get(&pool, tab_id) {
                Ok(tab) => tab,
                Err(e) => {
                    warn!(tab_id, error = %e, "Tab fetch failed");
                    continue;
                }
            };
            Self::enrich_one(&pool, &enricher, entity_id, &entity.name, tab.as_ref()).await;
        }
    }

    fn open_resources(settings: &Settings) -> Option<(DbPool, EntityEnricher, EmbeddingClient)> {
        // The worker owns its connection and clients; it never shares
        // them with the request-handling path.
        let pool = match DbPool::new(&settings.db_path) {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "Enrichment worker could not open the database");
                return None;
            }
        };
        let agent = AgentClient::new(
            &settings.agent_base_url,
            &settings.search_base_url,
            &settings.you_api_key,
        );
        let embedder = EmbeddingClient::new(
            &settings.openai_base_url,
            &settings.openai_api_key,
            &settings.embedding_model,
        );
        Some((pool, EntityEnricher::new(agent), embedder))
    }

    /// Enrich one entity against one representative tab and persist the
    /// result as a per-tab context plus the global entity fields.
    async fn enrich_one(
        pool: &DbPool,
        enricher: &EntityEnricher,
        entity_id: i64,
        name: &str,
        representative: Option<&Tab>,
    ) {
        let context = representative.map(|tab| {
            let related: Vec<String> = links::entities_for_tab(pool, tab.id)
                .unwrap_or_default()
                .into_iter()
                .map(|e| e.name)
                .filter(|other| other != name)
                .take(5)
                .collect();
            EnrichmentContext {
                tab_id: Some(tab.id),
                tab_url: Some(tab.url.clone()),
                tab_title: Some(tab.title.clone()),
                tab_summary: tab.summary.clone(),
                related_entities: related,
            }
        });

        let enrichment = enricher.enrich(name, context.as_ref()).await;
        if !enrichment.is_enriched {
            debug!(entity = name, "Enrichment produced no description, skipping");
            return;
        }
        let Some(description) = enrichment.description.as_deref() else {
            return;
        };

        if let Some(tab_id) = enrichment.tab_id {
            if let Err(e) = contexts::upsert(pool, entity_id, tab_id, description) {
                warn!(entity = name, tab_id, error = %e, "Context write failed");
            }
        }
        if let Err(e) = entities::update_enrichment(
            pool,
            entity_id,
            description,
            &enrichment.entity_type,
            &enrichment.related_concepts,
            enrichment.source_url.as_deref(),
        ) {
            warn!(entity = name, error = %e, "Enrichment write failed");
        }
    }
}
