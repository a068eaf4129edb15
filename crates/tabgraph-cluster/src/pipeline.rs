//! Batch ingestion pipeline.
//!
//! Takes the browser's full current tab set as ground truth, reconciles
//! it against the graph store and the cluster engine, fills in missing
//! embeddings and entities with batched API calls, assigns every tab to
//! a cluster, persists the side effects, and schedules background
//! enrichment. The engine lock is held for the duration of one ingest,
//! serializing concurrent ingests end-to-end.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tabgraph_agents::{EmbeddingClient, EntityExtractor, TabSummarizer};
use tabgraph_core::{Entity, Settings, Tab};
use tabgraph_db::queries::{entities, links, relationships, tabs};
use tabgraph_db::DbPool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::ClusterEngine;
use crate::model::TabCluster;
use crate::worker::EnrichmentWorker;

/// Maximum entities extracted per tab.
const MAX_ENTITIES_PER_TAB: usize = 8;

/// Minimum shared entities for a tab-tab edge.
const MIN_SHARED_ENTITIES: i64 = 1;

/// Per-tab payload returned to the caller so it can cache embeddings
/// and entities and skip the API calls on the next ingest.
#[derive(Debug, Clone, Serialize)]
pub struct TabCachePayload {
    pub id: i64,
    pub embedding: Vec<f32>,
    pub entities: Vec<String>,
}

/// Result of one ingest call.
#[derive(Debug, Serialize)]
pub struct IngestOutcome {
    pub session_id: String,
    pub processed: usize,
    pub important_tabs: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub tab_data: Vec<TabCachePayload>,
}

/// The ingest pipeline and the shared state behind it.
pub struct IngestPipeline {
    db: DbPool,
    engine: Mutex<ClusterEngine>,
    embedder: EmbeddingClient,
    extractor: EntityExtractor,
    summarizer: TabSummarizer,
    settings: Settings,
}

impl IngestPipeline {
    pub fn new(
        db: DbPool,
        engine: ClusterEngine,
        embedder: EmbeddingClient,
        extractor: EntityExtractor,
        summarizer: TabSummarizer,
        settings: Settings,
    ) -> Self {
        Self {
            db,
            engine: Mutex::new(engine),
            embedder,
            extractor,
            summarizer,
            settings,
        }
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    /// Snapshot of the live cluster set.
    pub async fn clusters_snapshot(&self) -> Vec<TabCluster> {
        self.engine.lock().await.clusters().to_vec()
    }

    /// Ingest the full current set of open tabs.
    pub async fn ingest(&self, mut batch: Vec<Tab>, ingested_at: DateTime<Utc>) -> Result<IngestOutcome> {
        let mut engine = self.engine.lock().await;
        let session_id = Uuid::new_v4().to_string();

        // Intake: split cached from missing.
        let cache_hits = batch
            .iter()
            .filter(|t| t.embedding.is_some() && !t.entities.is_empty())
            .count();
        let cache_misses = batch.len() - cache_hits;
        for tab in &mut batch {
            tab.opened_at = ingested_at;
        }
        info!(
            tabs = batch.len(),
            cache_hits, cache_misses, session = %session_id,
            "Ingesting tab batch"
        );

        // Reconcile: the batch is ground truth; close everything else.
        let active_ids: HashSet<i64> = batch.iter().map(|t| t.id).collect();
        for stored in tabs::list_active(&self.db)? {
            if !active_ids.contains(&stored.id) {
                debug!(tab = stored.id, "Closing tab absent from ingest");
                tabs::mark_closed(&self.db, stored.id)?;
                links::unlink_all(&self.db, stored.id)?;
                relationships::delete_for_tab(&self.db, stored.id)?;
                engine.remove_tab(stored.id);
            }
        }
        entities::remove_orphans(&self.db)?;

        // Batch embed and batch extract concurrently for the misses.
        let embed_indices: Vec<usize> = batch
            .iter()
            .enumerate()
            .filter(|(_, t)| t.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        let embed_texts: Vec<String> = embed_indices
            .iter()
            .map(|&i| batch[i].embedding_text())
            .collect();

        let extract_indices: Vec<usize> = batch
            .iter()
            .enumerate()
            .filter(|(_, t)| t.entities.is_empty())
            .map(|(i, _)| i)
            .collect();
        let extract_input: Vec<(String, String)> = extract_indices
            .iter()
            .map(|&i| (batch[i].title.clone(), batch[i].url.clone()))
            .collect();

        let (embeddings, extracted) = tokio::join!(
            self.embedder.embed_batch(&embed_texts),
            self.extractor.extract_batch(&extract_input, MAX_ENTITIES_PER_TAB),
        );

        match embeddings {
            Ok(embeddings) => {
                for (&i, embedding) in embed_indices.iter().zip(embeddings) {
                    batch[i].embedding = Some(embedding);
                }
            }
            // Tabs without embeddings still cluster (each seeds its own);
            // the next ingest retries.
            Err(e) => warn!(error = %e, "Batch embedding failed, proceeding without embeddings"),
        }
        for (&i, extracted_entities) in extract_indices.iter().zip(extracted) {
            batch[i].entities = extracted_entities;
        }

        // Assign in batch order, persisting side effects inline.
        let before_ids: HashSet<String> =
            engine.clusters().iter().map(|c| c.id.clone()).collect();

        for tab in &batch {
            engine.process_tab(tab.clone()).await;

            tabs::upsert(&self.db, tab)?;
            for name in &tab.entities {
                let entity_id = entities::upsert(&self.db, &Entity::concept(name.as_str()))?;
                links::link(&self.db, tab.id, entity_id)?;
            }
            if !tab.entities.is_empty() {
                relationships::rebuild_for_tab(&self.db, tab.id, MIN_SHARED_ENTITIES)?;
            }
        }

        // Deferred naming for clusters created in this batch.
        let created: HashSet<String> = engine
            .clusters()
            .iter()
            .map(|c| c.id.clone())
            .filter(|id| !before_ids.contains(id))
            .collect();
        engine.name_new_clusters(&created).await;
        drop(engine);

        // Background work never blocks the response.
        if self.settings.enable_background_enrichment {
            let mut names: Vec<String> = Vec::new();
            let mut seen = HashSet::new();
            for tab in &batch {
                for entity in &tab.entities {
                    if seen.insert(entity.clone()) {
                        names.push(entity.clone());
                    }
                }
            }
            EnrichmentWorker::spawn(self.settings.clone(), names);
            self.spawn_metadata_fill(&batch)?;
        }

        let important_tabs = batch.iter().filter(|t| t.important).count();
        let tab_data: Vec<TabCachePayload> = batch
            .iter()
            .filter(|t| t.embedding.is_some() && !t.entities.is_empty())
            .map(|t| TabCachePayload {
                id: t.id,
                embedding: t.embedding.clone().unwrap_or_default(),
                entities: t.entities.clone(),
            })
            .collect();

        Ok(IngestOutcome {
            session_id,
            processed: batch.len(),
            important_tabs,
            cache_hits,
            cache_misses,
            tab_data,
        })
    }

    /// Generate label/source/summary for tabs that lack them, off the
    /// request path and off the engine lock.
    fn spawn_metadata_fill(&self, batch: &[Tab]) -> Result<()> {
        let mut missing: Vec<(i64, String, String)> = Vec::new();
        for tab in batch {
            let stored = tabs::get(&self.db, tab.id)?;
            if stored.is_some_and(|s| s.label.is_none()) {
                missing.push((tab.id, tab.title.clone(), tab.url.clone()));
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let summarizer = self.summarizer.clone();
        let db_path = self.settings.db_path.clone();
        tokio::spawn(async move {
            let pool = match DbPool::new(&db_path) {
                Ok(pool) => pool,
                Err(e) => {
                    warn!(error = %e, "Metadata task could not open the database");
                    return;
                }
            };
            for (tab_id, title, url) in missing {
                if let Some(metadata) = summarizer.summarize(&title, &url).await {
                    if let Err(e) = tabs::update_metadata(&pool, tab_id, &metadata) {
                        warn!(tab = tab_id, error = %e, "Metadata write failed");
                    }
                }
            }
        });
        Ok(())
    }

    /// Hard-delete the listed tabs, then orphan-collect entities.
    pub async fn delete_tabs(&self, tab_ids: &[i64]) -> Result<usize> {
        let mut engine = self.engine.lock().await;

        let mut deleted = 0;
        for &tab_id in tab_ids {
            engine.remove_tab(tab_id);
            if tabs::delete(&self.db, tab_id)? {
                deleted += 1;
            }
        }
        entities::remove_orphans(&self.db)?;

        info!(deleted, "Deleted tabs");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabgraph_agents::{
        provider_from_settings, AgentClient, ClusterNamer, LlmClient,
    };
    use tabgraph_db::pool::test_pool;

    /// A pipeline whose external clients all point at a closed port, so
    /// every API call fails fast and the fallback paths run.
    fn test_pipeline() -> IngestPipeline {
        let settings = Settings {
            openai_api_key: "test-key".to_string(),
            you_api_key: "test-key".to_string(),
            gemini_api_key: None,
            embedding_model: "test-embed".to_string(),
            llm_model: "test-llm".to_string(),
            openai_base_url: "http://127.0.0.1:9".to_string(),
            agent_base_url: "http://127.0.0.1:9".to_string(),
            search_base_url: "http://127.0.0.1:9".to_string(),
            db_path: std::path::PathBuf::from(":memory:"),
            tab_metadata_provider: "you".to_string(),
            similarity_threshold: 0.5,
            entity_weight: 0.5,
            rename_threshold: 3,
            enrichment_cache_ttl_days: 7,
            enable_background_enrichment: false,
        };

        let db = test_pool();
        let llm = LlmClient::new(&settings.openai_base_url, &settings.openai_api_key, &settings.llm_model);
        let agent = AgentClient::new(
            &settings.agent_base_url,
            &settings.search_base_url,
            &settings.you_api_key,
        );
        let engine = ClusterEngine::new(
            db.clone(),
            ClusterNamer::new(llm.clone()),
            settings.similarity_threshold,
            settings.rename_threshold,
            settings.entity_weight,
        );
        let embedder = EmbeddingClient::new(
            &settings.openai_base_url,
            &settings.openai_api_key,
            &settings.embedding_model,
        );
        let extractor = EntityExtractor::new(llm);
        let summarizer = TabSummarizer::new(provider_from_settings(&settings, agent));

        IngestPipeline::new(db, engine, embedder, extractor, summarizer, settings)
    }

    fn cached_tab(id: i64, embedding: Vec<f32>, entities: &[&str]) -> Tab {
        let mut tab = Tab::new(id, format!("https://t/{}", id), format!("Tab {}", id));
        tab.embedding = Some(embedding);
        tab.entities = entities.iter().map(|e| e.to_string()).collect();
        tab
    }

    #[tokio::test]
    async fn reconciliation_closes_absent_tabs_and_collects_orphans() {
        let pipeline = test_pipeline();

        let first = vec![
            cached_tab(1, vec![1.0, 0.0], &["OnlyOnTabOne"]),
            cached_tab(2, vec![1.0, 0.0], &["Shared"]),
            cached_tab(3, vec![1.0, 0.0], &["Shared"]),
        ];
        let outcome = pipeline.ingest(first, Utc::now()).await.unwrap();
        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.cache_hits, 3);

        let second = vec![
            cached_tab(2, vec![1.0, 0.0], &["Shared"]),
            cached_tab(3, vec![1.0, 0.0], &["Shared"]),
            cached_tab(4, vec![0.0, 1.0], &["Fresh"]),
        ];
        pipeline.ingest(second, Utc::now()).await.unwrap();

        // Tab 1 is inactive, not deleted.
        let stored = tabs::get(pipeline.db(), 1).unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(stored.closed_at.is_some());

        // Its exclusive entity is gone, the shared one remains.
        assert!(entities::get_by_name(pipeline.db(), "OnlyOnTabOne", None)
            .unwrap()
            .is_none());
        assert!(entities::get_by_name(pipeline.db(), "Shared", None)
            .unwrap()
            .is_some());

        // Tab 4 was created and clustered.
        assert!(tabs::get(pipeline.db(), 4).unwrap().unwrap().is_active);
        let clusters = pipeline.clusters_snapshot().await;
        assert!(clusters.iter().any(|c| c.contains_tab(4)));
    }

    #[tokio::test]
    async fn repeated_ingest_is_idempotent_on_membership() {
        let pipeline = test_pipeline();
        let batch = vec![
            cached_tab(1, vec![1.0, 0.0], &["Neo4j", "Cypher"]),
            cached_tab(2, vec![0.95, 0.05], &["Neo4j", "Cypher"]),
            cached_tab(3, vec![0.0, 1.0], &["React"]),
        ];

        pipeline.ingest(batch.clone(), Utc::now()).await.unwrap();
        let memberships = |clusters: &[TabCluster]| -> Vec<Vec<i64>> {
            let mut sets: Vec<Vec<i64>> = clusters
                .iter()
                .map(|c| {
                    let mut ids: Vec<i64> = c.tabs.iter().map(|t| t.id).collect();
                    ids.sort();
                    ids
                })
                .collect();
            sets.sort();
            sets
        };
        let first = memberships(&pipeline.clusters_snapshot().await);

        pipeline.ingest(batch, Utc::now()).await.unwrap();
        let second = memberships(&pipeline.clusters_snapshot().await);

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn two_domain_batch_separates_into_two_clusters() {
        let pipeline = test_pipeline();
        let batch = vec![
            cached_tab(1, vec![1.0, 0.0], &["Neo4j", "Graph Database"]),
            cached_tab(2, vec![0.9, 0.1], &["Cypher", "Neo4j"]),
            cached_tab(3, vec![0.0, 1.0], &["React", "JavaScript"]),
        ];
        pipeline.ingest(batch, Utc::now()).await.unwrap();

        let clusters = pipeline.clusters_snapshot().await;
        assert_eq!(clusters.len(), 2);

        let pair = clusters.iter().find(|c| c.tab_count() == 2).unwrap();
        assert!(pair.contains_tab(1) && pair.contains_tab(2));
        // The multi-tab cluster was batch-named (fallback naming here).
        assert_ne!(pair.name, crate::model::PLACEHOLDER_NAME);

        let single = clusters.iter().find(|c| c.tab_count() == 1).unwrap();
        assert!(single.contains_tab(3));
    }

    #[tokio::test]
    async fn single_tab_batch_never_names_the_cluster() {
        let pipeline = test_pipeline();
        pipeline
            .ingest(vec![cached_tab(1, vec![1.0, 0.0], &["React"])], Utc::now())
            .await
            .unwrap();

        let clusters = pipeline.clusters_snapshot().await;
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].name, crate::model::PLACEHOLDER_NAME);
    }

    #[tokio::test]
    async fn ingest_persists_links_and_edges() {
        let pipeline = test_pipeline();
        let batch = vec![
            cached_tab(1, vec![1.0, 0.0], &["Neo4j", "Cypher"]),
            cached_tab(2, vec![0.9, 0.1], &["Neo4j", "Graph Database"]),
        ];
        pipeline.ingest(batch, Utc::now()).await.unwrap();

        let tab_one_entities = links::entities_for_tab(pipeline.db(), 1).unwrap();
        assert_eq!(tab_one_entities.len(), 2);

        let edges = relationships::list_all(pipeline.db(), 0.0).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].shared_entities, vec!["Neo4j".to_string()]);
        // |{Neo4j}| / |{Neo4j, Cypher, Graph Database}|
        assert!((edges[0].strength - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn response_carries_cache_payload_for_complete_tabs() {
        let pipeline = test_pipeline();
        let mut incomplete = Tab::new(9, "https://t/9", "Tab 9");
        incomplete.entities = vec!["React".to_string()];
        // No embedding and the embedding API is unreachable.

        let outcome = pipeline
            .ingest(
                vec![cached_tab(1, vec![1.0, 0.0], &["React"]), incomplete],
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.tab_data.len(), 1);
        assert_eq!(outcome.tab_data[0].id, 1);
    }

    #[tokio::test]
    async fn delete_tabs_drops_rows_and_shrinks_clusters() {
        let pipeline = test_pipeline();
        let batch = vec![
            cached_tab(1, vec![1.0, 0.0], &["Neo4j"]),
            cached_tab(2, vec![1.0, 0.0], &["Neo4j"]),
        ];
        pipeline.ingest(batch, Utc::now()).await.unwrap();
        assert_eq!(pipeline.clusters_snapshot().await.len(), 1);

        let deleted = pipeline.delete_tabs(&[2]).await.unwrap();
        assert_eq!(deleted, 1);

        // 2 -> 1 tabs deletes the cluster from the live set.
        assert!(pipeline.clusters_snapshot().await.is_empty());
        assert!(tabs::get(pipeline.db(), 2).unwrap().is_none());
    }

    #[tokio::test]
    async fn important_tabs_are_counted() {
        let pipeline = test_pipeline();
        let mut tab = cached_tab(1, vec![1.0, 0.0], &["React"]);
        tab.important = true;
        let outcome = pipeline
            .ingest(vec![tab, cached_tab(2, vec![1.0, 0.0], &["React"])], Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome.important_tabs, 1);
    }
}
