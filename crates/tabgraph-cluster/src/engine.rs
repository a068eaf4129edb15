//! Online centroid-based cluster engine.
//!
//! Maintains the live cluster set and per-tab assignment entirely in
//! memory. Assignment uses hybrid similarity (cosine over embeddings
//! blended with Jaccard over entity sets); centroids are recomputed
//! eagerly on every add and every remove so a cluster never keeps the
//! signature of tabs that left it.

use std::collections::HashSet;

use serde::Serialize;
use tabgraph_agents::naming::NamingRequest;
use tabgraph_agents::ClusterNamer;
use tabgraph_core::Tab;
use tabgraph_db::queries::entities;
use tabgraph_db::DbPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{ClusterColor, TabCluster, PLACEHOLDER_NAME};

/// Sample size of titles and entities handed to the naming prompt.
const NAMING_SAMPLE: usize = 10;

/// Cosine similarity between two vectors. Zero for empty, zero-norm or
/// mismatched-length inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Jaccard similarity between two entity name lists. Zero when either
/// side is empty.
pub fn jaccard_similarity(a: &[String], b: &[String]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f32 / union as f32
}

fn mean_vectors(vectors: &[&[f32]]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    let mut sum = vec![0.0f32; dim];
    let mut count = 0usize;
    for vector in vectors {
        if vector.len() != dim {
            continue;
        }
        for (acc, value) in sum.iter_mut().zip(vector.iter()) {
            *acc += value;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    for value in &mut sum {
        *value /= count as f32;
    }
    Some(sum)
}

/// Snapshot of the engine for diagnostics.
#[derive(Debug, Serialize)]
pub struct ClusterStats {
    pub total_clusters: usize,
    pub total_tabs: usize,
    pub avg_tabs_per_cluster: f64,
    pub clusters: Vec<ClusterStatEntry>,
}

#[derive(Debug, Serialize)]
pub struct ClusterStatEntry {
    pub id: String,
    pub name: String,
    pub color: ClusterColor,
    pub tab_count: usize,
    pub tabs_added_since_naming: u32,
}

/// The cluster engine. Methods require exclusive access; the ingest
/// pipeline holds a lock around it for the duration of one ingest.
pub struct ClusterEngine {
    db: DbPool,
    namer: ClusterNamer,
    similarity_threshold: f32,
    rename_threshold: u32,
    /// Weight of entity overlap in hybrid scoring; 0 disables hybrid.
    entity_weight: f32,
    clusters: Vec<TabCluster>,
    next_color_index: usize,
}

impl ClusterEngine {
    pub fn new(
        db: DbPool,
        namer: ClusterNamer,
        similarity_threshold: f32,
        rename_threshold: u32,
        entity_weight: f32,
    ) -> Self {
        Self {
            db,
            namer,
            similarity_threshold,
            rename_threshold,
            entity_weight,
            clusters: Vec::new(),
            next_color_index: 0,
        }
    }

    pub fn clusters(&self) -> &[TabCluster] {
        &self.clusters
    }

    pub fn cluster_by_id(&self, cluster_id: &str) -> Option<&TabCluster> {
        self.clusters.iter().find(|c| c.id == cluster_id)
    }

    pub fn cluster_for_tab(&self, tab_id: i64) -> Option<&TabCluster> {
        self.clusters.iter().find(|c| c.contains_tab(tab_id))
    }

    fn next_color(&mut self) -> ClusterColor {
        let color = ClusterColor::PALETTE[self.next_color_index];
        self.next_color_index = (self.next_color_index + 1) % ClusterColor::PALETTE.len();
        color
    }

    fn hybrid_similarity(&self, tab: &Tab, embedding: &[f32], cluster: &TabCluster) -> f32 {
        let centroid = cluster.centroid.as_deref().unwrap_or_default();
        if self.entity_weight > 0.0 && !tab.entities.is_empty() && !cluster.shared_entities.is_empty()
        {
            let embedding_sim = cosine_similarity(embedding, centroid);
            let entity_sim = jaccard_similarity(&tab.entities, &cluster.shared_entities);
            (1.0 - self.entity_weight) * embedding_sim + self.entity_weight * entity_sim
        } else {
            cosine_similarity(embedding, centroid)
        }
    }

    /// Best-scoring cluster for a tab, if any reaches the threshold.
    ///
    /// The first cluster to reach the best score wins; iteration order
    /// over the cluster list is stable, so assignment is deterministic.
    pub fn find_best_cluster(&self, tab: &Tab) -> Option<(usize, f32)> {
        let embedding = tab.embedding.as_deref()?;

        let mut best: Option<(usize, f32)> = None;
        for (idx, cluster) in self.clusters.iter().enumerate() {
            if cluster.centroid.is_none() {
                continue;
            }
            let similarity = self.hybrid_similarity(tab, embedding, cluster);
            if best.map_or(true, |(_, score)| similarity > score) {
                best = Some((idx, similarity));
            }
        }

        best.filter(|(_, score)| *score >= self.similarity_threshold)
    }

    /// Recompute centroid and shared entities for one cluster.
    fn refresh_cluster(&mut self, idx: usize) {
        let db = self.db.clone();
        let cluster = &mut self.clusters[idx];
        recompute_centroid(&db, cluster);
        recompute_shared_entities(cluster);
    }

    /// Add a tab to an existing cluster; recomputes centroid and shared
    /// entities, then renames online when the add threshold is reached.
    pub async fn add_tab_to_cluster(&mut self, idx: usize, tab: Tab) {
        self.clusters[idx].add_tab(tab);
        self.refresh_cluster(idx);
        self.maybe_rename(idx).await;
    }

    /// Create a new cluster seeded with this tab.
    ///
    /// New clusters carry the placeholder name; naming happens online
    /// once enough tabs joined, or in the end-of-ingest batch pass.
    pub fn create_cluster(&mut self, tab: Tab) -> String {
        let color = self.next_color();
        let mut cluster = TabCluster::new(Uuid::new_v4().to_string(), color);
        let cluster_id = cluster.id.clone();
        cluster.add_tab(tab);

        self.clusters.push(cluster);
        let idx = self.clusters.len() - 1;
        self.refresh_cluster(idx);

        info!(cluster = %short_id(&cluster_id), "Created new cluster");
        cluster_id
    }

    /// Assign one tab: join the best-scoring cluster at or above the
    /// threshold, otherwise seed a new cluster. Returns the cluster id.
    pub async fn process_tab(&mut self, tab: Tab) -> String {
        match self.find_best_cluster(&tab) {
            Some((idx, similarity)) => {
                debug!(
                    title = %tab.title,
                    cluster = %self.clusters[idx].name,
                    similarity,
                    "Assigning tab to existing cluster"
                );
                let cluster_id = self.clusters[idx].id.clone();
                self.add_tab_to_cluster(idx, tab).await;
                cluster_id
            }
            None => self.create_cluster(tab),
        }
    }

    /// Remove a tab wherever it lives. Recomputes the owning cluster
    /// eagerly and deletes it when it drops below two tabs. Removals
    /// never trigger a rename.
    pub fn remove_tab(&mut self, tab_id: i64) -> bool {
        let Some(idx) = self.clusters.iter().position(|c| c.contains_tab(tab_id)) else {
            return false;
        };

        self.clusters[idx].remove_tab(tab_id);
        self.refresh_cluster(idx);

        if self.clusters[idx].is_undersized() {
            let removed = self.clusters.remove(idx);
            info!(
                cluster = %short_id(&removed.id),
                name = %removed.name,
                "Deleted cluster with fewer than 2 tabs"
            );
        }
        true
    }

    async fn maybe_rename(&mut self, idx: usize) {
        let (eligible, cluster_id) = {
            let cluster = &self.clusters[idx];
            (
                cluster.tab_count() >= 2 && cluster.should_rename(self.rename_threshold),
                cluster.id.clone(),
            )
        };
        if !eligible {
            return;
        }

        let request = naming_request(&self.clusters[idx]);
        let name = match self.namer.name_cluster(&request).await {
            Ok(name) => name,
            Err(e) => {
                warn!(cluster = %short_id(&cluster_id), error = %e, "Cluster naming failed");
                fallback_name(&cluster_id)
            }
        };

        let cluster = &mut self.clusters[idx];
        cluster.name = name;
        cluster.tabs_added_since_naming = 0;
        info!(cluster = %short_id(&cluster_id), name = %cluster.name, "Renamed cluster");
    }

    /// Batch-name the clusters created during this ingest.
    ///
    /// Only clusters that still carry the placeholder name and hold two
    /// or more tabs are named; singletons stay placeholder-named. One
    /// structured call covers all of them; a length mismatch falls back
    /// to per-cluster naming.
    pub async fn name_new_clusters(&mut self, created_ids: &HashSet<String>) {
        let eligible: Vec<usize> = self
            .clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                created_ids.contains(&c.id) && c.name == PLACEHOLDER_NAME && c.tab_count() >= 2
            })
            .map(|(idx, _)| idx)
            .collect();
        if eligible.is_empty() {
            return;
        }

        let requests: Vec<NamingRequest> = eligible
            .iter()
            .map(|&idx| naming_request(&self.clusters[idx]))
            .collect();

        match self.namer.name_clusters_batch(&requests).await {
            Ok(names) => {
                for (&idx, name) in eligible.iter().zip(names) {
                    let cluster = &mut self.clusters[idx];
                    cluster.name = name;
                    cluster.tabs_added_since_naming = 0;
                    info!(cluster = %short_id(&cluster.id), name = %cluster.name, "Named new cluster");
                }
            }
            Err(e) => {
                warn!(error = %e, "Batch naming failed, naming clusters individually");
                for &idx in &eligible {
                    let request = naming_request(&self.clusters[idx]);
                    let cluster_id = self.clusters[idx].id.clone();
                    let name = self
                        .namer
                        .name_cluster(&request)
                        .await
                        .unwrap_or_else(|_| fallback_name(&cluster_id));
                    let cluster = &mut self.clusters[idx];
                    cluster.name = name;
                    cluster.tabs_added_since_naming = 0;
                }
            }
        }
    }

    /// The most frequent entities within a cluster.
    pub fn hub_entities(cluster: &TabCluster, top_n: usize) -> Vec<String> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for tab in &cluster.tabs {
            for entity in &tab.entities {
                match counts.iter_mut().find(|(name, _)| name == entity) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((entity.clone(), 1)),
                }
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts.into_iter().take(top_n).map(|(name, _)| name).collect()
    }

    pub fn stats(&self) -> ClusterStats {
        let total_tabs: usize = self.clusters.iter().map(|c| c.tab_count()).sum();
        ClusterStats {
            total_clusters: self.clusters.len(),
            total_tabs,
            avg_tabs_per_cluster: if self.clusters.is_empty() {
                0.0
            } else {
                total_tabs as f64 / self.clusters.len() as f64
            },
            clusters: self
                .clusters
                .iter()
                .map(|c| ClusterStatEntry {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    color: c.color,
                    tab_count: c.tab_count(),
                    tabs_added_since_naming: c.tabs_added_since_naming,
                })
                .collect(),
        }
    }
}

fn short_id(cluster_id: &str) -> &str {
    &cluster_id[..cluster_id.len().min(8)]
}

fn fallback_name(cluster_id: &str) -> String {
    format!("Cluster {}", short_id(cluster_id))
}

fn naming_request(cluster: &TabCluster) -> NamingRequest {
    NamingRequest {
        titles: cluster.titles().into_iter().take(NAMING_SAMPLE).collect(),
        entities: cluster
            .shared_entities
            .iter()
            .take(NAMING_SAMPLE)
            .cloned()
            .collect(),
    }
}

/// Recompute a cluster centroid from its current members.
///
/// Preferred source: the mean of the cluster's unique entity-name
/// embeddings, batch-fetched from the graph store. Falls back to the
/// mean of tab embeddings, then to no centroid at all (the cluster then
/// cannot attract tabs by similarity).
fn recompute_centroid(db: &DbPool, cluster: &mut TabCluster) {
    if cluster.tabs.is_empty() {
        cluster.centroid = None;
        cluster.centroid_dirty = false;
        return;
    }

    let mut names: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for tab in &cluster.tabs {
        for entity in &tab.entities {
            if seen.insert(entity.clone()) {
                names.push(entity.clone());
            }
        }
    }

    if !names.is_empty() {
        match entities::get_by_names(db, &names) {
            Ok(stored) => {
                let embeddings: Vec<&[f32]> = stored
                    .iter()
                    .filter_map(|e| e.embedding.as_deref())
                    .collect();
                if let Some(centroid) = mean_vectors(&embeddings) {
                    cluster.centroid = Some(centroid);
                    cluster.centroid_dirty = false;
                    return;
                }
            }
            Err(e) => warn!(error = %e, "Entity embedding fetch failed, using tab embeddings"),
        }
    }

    let tab_embeddings: Vec<&[f32]> = cluster
        .tabs
        .iter()
        .filter_map(|t| t.embedding.as_deref())
        .collect();
    cluster.centroid = mean_vectors(&tab_embeddings);
    cluster.centroid_dirty = false;
}

/// Recompute the ranked shared-entity list for a cluster.
///
/// Entities must appear in at least two tabs, except in a single-tab
/// cluster where all of the tab's entities count. Ordered by frequency
/// descending.
fn recompute_shared_entities(cluster: &mut TabCluster) {
    if cluster.tabs.is_empty() {
        cluster.shared_entities = Vec::new();
        return;
    }

    let mut counts: Vec<(String, usize)> = Vec::new();
    for tab in &cluster.tabs {
        for entity in &tab.entities {
            match counts.iter_mut().find(|(name, _)| name == entity) {
                Some((_, count)) => *count += 1,
                None => counts.push((entity.clone(), 1)),
            }
        }
    }

    let min_occurrences = if cluster.tabs.len() > 1 { 2 } else { 1 };
    let mut shared: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count >= min_occurrences)
        .collect();
    shared.sort_by(|a, b| b.1.cmp(&a.1));
    cluster.shared_entities = shared.into_iter().map(|(name, _)| name).collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabgraph_agents::LlmClient;
    use tabgraph_db::pool::test_pool;
    use tabgraph_db::queries::entities as entity_queries;
    use tabgraph_core::Entity;

    /// Engine whose namer points at nothing; naming falls back to the
    /// deterministic "Cluster <id>" form.
    fn test_engine(threshold: f32, rename_threshold: u32, entity_weight: f32) -> ClusterEngine {
        let namer = ClusterNamer::new(LlmClient::new("http://127.0.0.1:9", "test-key", "test-model"));
        ClusterEngine::new(test_pool(), namer, threshold, rename_threshold, entity_weight)
    }

    fn tab_with_embedding(id: i64, embedding: Vec<f32>) -> Tab {
        let mut tab = Tab::new(id, format!("https://t/{}", id), format!("Tab {}", id));
        tab.embedding = Some(embedding);
        tab
    }

    fn tab_with_entities(id: i64, embedding: Vec<f32>, entities: &[&str]) -> Tab {
        let mut tab = tab_with_embedding(id, embedding);
        tab.entities = entities.iter().map(|e| e.to_string()).collect();
        tab
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn jaccard_similarity_basics() {
        let a = vec!["React".to_string(), "JavaScript".to_string()];
        let b = vec!["React".to_string(), "Vue".to_string(), "JavaScript".to_string()];
        assert!((jaccard_similarity(&a, &b) - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(jaccard_similarity(&a, &[]), 0.0);
    }

    #[tokio::test]
    async fn assigns_above_threshold_and_seeds_below() {
        let mut engine = test_engine(0.75, 3, 0.0);

        let first = engine.process_tab(tab_with_embedding(1, vec![1.0, 0.0, 0.0])).await;
        assert_eq!(engine.clusters().len(), 1);

        // Similar tab joins.
        let second = engine.process_tab(tab_with_embedding(2, vec![0.9, 0.1, 0.0])).await;
        assert_eq!(first, second);
        assert_eq!(engine.clusters().len(), 1);
        assert_eq!(engine.clusters()[0].tab_count(), 2);

        // Orthogonal tab seeds a new cluster.
        let third = engine.process_tab(tab_with_embedding(3, vec![0.0, 1.0, 0.0])).await;
        assert_ne!(first, third);
        assert_eq!(engine.clusters().len(), 2);
    }

    #[tokio::test]
    async fn centroid_is_mean_of_tab_embeddings() {
        let mut engine = test_engine(0.5, 99, 0.0);
        engine.process_tab(tab_with_embedding(1, vec![1.0, 0.0, 0.0])).await;
        engine.process_tab(tab_with_embedding(2, vec![0.0, 1.0, 0.0])).await;

        let centroid = engine.clusters()[0].centroid.as_ref().unwrap();
        assert!((centroid[0] - 0.5).abs() < 1e-6);
        assert!((centroid[1] - 0.5).abs() < 1e-6);
        assert!(centroid[2].abs() < 1e-6);
    }

    #[tokio::test]
    async fn centroid_prefers_entity_embeddings() {
        let mut engine = test_engine(0.5, 99, 0.5);

        let entity_id = entity_queries::upsert(&engine.db, &Entity::concept("React")).unwrap();
        entity_queries::update_embedding(&engine.db, entity_id, &[0.0, 0.0, 1.0]).unwrap();

        engine
            .process_tab(tab_with_entities(1, vec![1.0, 0.0, 0.0], &["React"]))
            .await;

        let centroid = engine.clusters()[0].centroid.as_ref().unwrap();
        assert_eq!(centroid, &vec![0.0, 0.0, 1.0]);
    }

    #[tokio::test]
    async fn removal_updates_centroid_and_prevents_ghost_cluster() {
        let mut engine = test_engine(0.7, 99, 0.0);

        // Three React-ish tabs and two Vue-ish tabs end up together.
        engine.process_tab(tab_with_embedding(1, vec![0.2, 0.8, 0.0])).await;
        engine.process_tab(tab_with_embedding(2, vec![0.25, 0.75, 0.0])).await;
        engine.process_tab(tab_with_embedding(3, vec![0.2, 0.8, 0.0])).await;
        let cluster_idx = 0;
        engine.clusters[cluster_idx].add_tab(tab_with_embedding(4, vec![0.8, 0.2, 0.0]));
        engine.clusters[cluster_idx].add_tab(tab_with_embedding(5, vec![0.75, 0.25, 0.0]));
        engine.refresh_cluster(cluster_idx);

        let mixed_centroid = engine.clusters()[0].centroid.clone().unwrap();

        engine.remove_tab(4);
        engine.remove_tab(5);

        let pure_centroid = engine.clusters()[0].centroid.clone().unwrap();
        assert_ne!(mixed_centroid, pure_centroid);

        // A fresh Vue-like tab must not rejoin the now-pure cluster.
        let vue_tab = tab_with_embedding(6, vec![0.8, 0.2, 0.0]);
        let similarity = cosine_similarity(vue_tab.embedding.as_ref().unwrap(), &pure_centroid);
        assert!(similarity < 0.7);

        let assigned = engine.process_tab(vue_tab).await;
        assert_eq!(engine.clusters().len(), 2);
        assert_eq!(engine.cluster_by_id(&assigned).unwrap().tab_count(), 1);
    }

    #[tokio::test]
    async fn cluster_deleted_below_two_tabs_and_color_not_reclaimed() {
        let mut engine = test_engine(0.5, 99, 0.0);
        engine.process_tab(tab_with_embedding(1, vec![1.0, 0.0])).await;
        engine.process_tab(tab_with_embedding(2, vec![1.0, 0.0])).await;
        assert_eq!(engine.clusters().len(), 1);
        let first_color = engine.clusters()[0].color;
        assert_eq!(first_color, ClusterColor::PALETTE[0]);

        engine.remove_tab(2);
        assert!(engine.clusters().is_empty());

        // The next cluster takes the next palette slot, not the freed one.
        engine.process_tab(tab_with_embedding(3, vec![0.0, 1.0])).await;
        assert_eq!(engine.clusters()[0].color, ClusterColor::PALETTE[1]);
    }

    #[tokio::test]
    async fn three_to_two_tabs_does_not_delete() {
        let mut engine = test_engine(0.5, 99, 0.0);
        for id in 1..=3 {
            engine.process_tab(tab_with_embedding(id, vec![1.0, 0.0])).await;
        }
        engine.remove_tab(3);
        assert_eq!(engine.clusters().len(), 1);
        assert_eq!(engine.clusters()[0].tab_count(), 2);
    }

    #[tokio::test]
    async fn rename_threshold_triggers_exactly_once_and_resets_counter() {
        let mut engine = test_engine(0.5, 3, 0.0);

        let cluster_id = engine.create_cluster(tab_with_embedding(1, vec![1.0, 0.0]));
        let initial_name = engine.clusters()[0].name.clone();
        assert_eq!(initial_name, PLACEHOLDER_NAME);

        engine.process_tab(tab_with_embedding(2, vec![1.0, 0.0])).await;
        assert_eq!(engine.clusters()[0].name, PLACEHOLDER_NAME);

        engine.process_tab(tab_with_embedding(3, vec![1.0, 0.0])).await;
        let renamed = engine.clusters()[0].name.clone();
        assert_ne!(renamed, initial_name);
        assert_eq!(renamed, format!("Cluster {}", &cluster_id[..8]));
        assert_eq!(engine.clusters()[0].tabs_added_since_naming, 0);

        // Removals never rename.
        engine.remove_tab(3);
        assert_eq!(engine.clusters()[0].name, renamed);
    }

    #[tokio::test]
    async fn batch_naming_skips_singletons() {
        let mut engine = test_engine(0.9, 99, 0.0);

        let single = engine.process_tab(tab_with_embedding(1, vec![1.0, 0.0])).await;
        let paired = engine.process_tab(tab_with_embedding(2, vec![0.0, 1.0])).await;
        engine.process_tab(tab_with_embedding(3, vec![0.0, 1.0])).await;

        let created: HashSet<String> = [single.clone(), paired.clone()].into_iter().collect();
        engine.name_new_clusters(&created).await;

        assert_eq!(engine.cluster_by_id(&single).unwrap().name, PLACEHOLDER_NAME);
        // The two-tab cluster got the per-cluster fallback name.
        assert_ne!(engine.cluster_by_id(&paired).unwrap().name, PLACEHOLDER_NAME);
    }

    #[tokio::test]
    async fn shared_entities_require_two_tabs_unless_singleton() {
        let mut engine = test_engine(0.4, 99, 0.5);

        engine
            .process_tab(tab_with_entities(1, vec![1.0, 0.0], &["React", "JavaScript", "Hooks"]))
            .await;
        // Singleton: all entities shared.
        assert_eq!(engine.clusters()[0].shared_entities.len(), 3);

        engine.clusters[0].add_tab(tab_with_entities(2, vec![1.0, 0.0], &["React", "JavaScript"]));
        engine.clusters[0].add_tab(tab_with_entities(3, vec![1.0, 0.0], &["React", "State"]));
        engine.refresh_cluster(0);

        // React appears 3x, JavaScript 2x; Hooks and State appear once.
        assert_eq!(
            engine.clusters()[0].shared_entities,
            vec!["React".to_string(), "JavaScript".to_string()]
        );
    }

    #[tokio::test]
    async fn hybrid_scoring_blends_entities_and_embeddings() {
        let mut engine = test_engine(0.5, 99, 0.5);

        engine
            .process_tab(tab_with_entities(1, vec![1.0, 0.0], &["Neo4j", "Cypher"]))
            .await;

        // Weak embedding match but identical entities: hybrid carries it.
        let tab = tab_with_entities(2, vec![0.4, 0.9], &["Neo4j", "Cypher"]);
        let (_, score) = engine.find_best_cluster(&tab).unwrap();
        assert!(score >= 0.5);

        // Same embedding but disjoint entities scores lower.
        let unrelated = tab_with_entities(3, vec![0.4, 0.9], &["Baking", "Flour"]);
        if let Some((_, unrelated_score)) = engine.find_best_cluster(&unrelated) {
            assert!(unrelated_score < score);
        }
    }

    #[tokio::test]
    async fn first_cluster_wins_ties() {
        let mut engine = test_engine(0.5, 99, 0.0);
        let first = engine.process_tab(tab_with_embedding(1, vec![1.0, 0.0])).await;
        // Force a second identical-centroid cluster.
        let second_tab = tab_with_embedding(2, vec![1.0, 0.0]);
        let second = engine.create_cluster(second_tab);
        assert_ne!(first, second);

        let (idx, _) = engine.find_best_cluster(&tab_with_embedding(3, vec![1.0, 0.0])).unwrap();
        assert_eq!(engine.clusters()[idx].id, first);
    }

    #[tokio::test]
    async fn tab_without_embedding_cannot_match() {
        let mut engine = test_engine(0.1, 99, 0.5);
        engine.process_tab(tab_with_embedding(1, vec![1.0, 0.0])).await;

        let bare = Tab::new(2, "https://t/2", "Tab 2");
        assert!(engine.find_best_cluster(&bare).is_none());
    }

    #[test]
    fn hub_entities_order_by_frequency() {
        let mut cluster = TabCluster::new("c".to_string(), ClusterColor::Blue);
        cluster.add_tab(tab_with_entities(1, vec![1.0], &["React", "JavaScript", "Hooks"]));
        cluster.add_tab(tab_with_entities(2, vec![1.0], &["React", "State Management", "JavaScript"]));
        cluster.add_tab(tab_with_entities(3, vec![1.0], &["React", "Components", "JSX"]));

        let hubs = ClusterEngine::hub_entities(&cluster, 3);
        assert_eq!(hubs.len(), 3);
        assert_eq!(hubs[0], "React");
        assert_eq!(hubs[1], "JavaScript");
    }
}
