//! Graph visualization assembler.
//!
//! Builds a node/edge view over the live cluster set and the graph
//! store: cluster, tab and entity nodes, containment and reference
//! edges, and a bounded number of entity-entity relationship edges from
//! the triplet store.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tabgraph_core::Entity;
use tabgraph_db::queries::{contexts, entities, triplets};
use tabgraph_db::DbPool;

use crate::model::{ClusterColor, TabCluster};

/// Layout weight for cluster-contains-tab edges.
const CONTAINS_WEIGHT: f64 = 2.0;

/// Layout weight for tab-references-entity edges.
const REFERENCES_WEIGHT: f64 = 0.5;

/// Filters applied while assembling the view.
#[derive(Debug, Clone)]
pub struct VizOptions {
    pub include_singletons: bool,
    pub time_range_hours: Option<i64>,
    pub min_cluster_size: usize,
    /// Cap on entity-entity relationship edges; triplets can form
    /// cycles, so the view is truncated rather than traversed.
    pub max_relationship_edges: usize,
}

impl Default for VizOptions {
    fn default() -> Self {
        Self {
            include_singletons: false,
            time_range_hours: None,
            min_cluster_size: 2,
            max_relationship_edges: 50,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GraphNode {
    pub data: NodeData,
}

#[derive(Debug, Serialize)]
pub struct NodeData {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: &'static str,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ClusterColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_entities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub important: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Context-specific descriptions keyed by tab id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_contexts: Option<HashMap<i64, String>>,
}

#[derive(Debug, Serialize)]
pub struct GraphEdge {
    pub data: EdgeData,
}

#[derive(Debug, Serialize)]
pub struct EdgeData {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: &'static str,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct VizMetadata {
    pub cluster_count: usize,
    pub tab_count: usize,
    pub entity_count: usize,
    pub min_cluster_size: usize,
    pub include_singletons: bool,
    pub time_range_hours: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct GraphVisualization {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub timestamp: DateTime<Utc>,
    pub metadata: VizMetadata,
}

fn truncate_label(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Assemble the node/edge view for rendering.
pub fn build_visualization(
    db: &DbPool,
    clusters: &[TabCluster],
    options: &VizOptions,
) -> Result<GraphVisualization> {
    let now = Utc::now();
    let cutoff = options.time_range_hours.map(|hours| now - Duration::hours(hours));
    let min_size = if options.include_singletons {
        1
    } else {
        options.min_cluster_size.max(1)
    };

    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut entity_names: Vec<String> = Vec::new();
    let mut seen_entities: HashSet<String> = HashSet::new();
    let mut cluster_count = 0;
    let mut tab_count = 0;

    for cluster in clusters {
        let tabs: Vec<_> = cluster
            .tabs
            .iter()
            .filter(|tab| cutoff.map_or(true, |c| tab.opened_at >= c))
            .collect();
        if tabs.len() < min_size {
            continue;
        }
        cluster_count += 1;

        nodes.push(GraphNode {
            data: NodeData {
                id: format!("cluster_{}", cluster.id),
                node_type: "cluster",
                label: cluster.name.clone(),
                color: Some(cluster.color),
                tab_count: Some(tabs.len()),
                shared_entities: Some(cluster.shared_entities.iter().take(5).cloned().collect()),
                cluster_id: None,
                url: None,
                summary: None,
                display_label: None,
                important: None,
                entities: None,
                opened_at: None,
                description: None,
                tab_contexts: None,
            },
        });

        for tab in tabs {
            tab_count += 1;
            nodes.push(GraphNode {
                data: NodeData {
                    id: format!("tab_{}", tab.id),
                    node_type: "tab",
                    label: tab
                        .label
                        .clone()
                        .unwrap_or_else(|| truncate_label(&tab.title, 50)),
                    color: Some(cluster.color),
                    tab_count: None,
                    shared_entities: None,
                    // Association kept as a plain field, not a compound
                    // parent, so renderers can lay tabs out freely.
                    cluster_id: Some(cluster.id.clone()),
                    url: Some(tab.url.clone()),
                    summary: tab.summary.clone(),
                    display_label: tab.display_label.clone(),
                    important: Some(tab.important),
                    entities: Some(tab.entities.clone()),
                    opened_at: Some(tab.opened_at),
                    description: None,
                    tab_contexts: None,
                },
            });
            edges.push(GraphEdge {
                data: EdgeData {
                    id: format!("edge_tab{}_cluster{}", tab.id, cluster.id),
                    source: format!("tab_{}", tab.id),
                    target: format!("cluster_{}", cluster.id),
                    edge_type: "contains",
                    weight: CONTAINS_WEIGHT,
                    predicate: None,
                    confidence: None,
                },
            });

            for entity in &tab.entities {
                if seen_entities.insert(entity.clone()) {
                    entity_names.push(entity.clone());
                }
            }
        }
    }

    // One node per distinct entity across the displayed tabs, with the
    // global description and the per-tab context map.
    let stored: HashMap<String, Entity> = entities::get_by_names(db, &entity_names)?
        .into_iter()
        .map(|entity| (entity.name.clone(), entity))
        .collect();

    for name in &entity_names {
        let entity = stored.get(name);
        let entity_id = entity.and_then(|e| e.id);
        let tab_contexts = match entity_id {
            Some(id) => contexts::map_for_entity(db, id)?,
            None => HashMap::new(),
        };

        nodes.push(GraphNode {
            data: NodeData {
                id: match entity_id {
                    Some(id) => format!("entity_{}", id),
                    None => format!("entity_{}", name),
                },
                node_type: "entity",
                label: name.clone(),
                color: None,
                tab_count: None,
                shared_entities: None,
                cluster_id: None,
                url: None,
                summary: None,
                display_label: None,
                important: None,
                entities: None,
                opened_at: None,
                description: entity.and_then(|e| e.web_description.clone()),
                tab_contexts: Some(tab_contexts),
            },
        });
    }

    // Tab-references-entity edges.
    let entity_node_id: HashMap<&String, String> = entity_names
        .iter()
        .map(|name| {
            let id = match stored.get(name).and_then(|e| e.id) {
                Some(id) => format!("entity_{}", id),
                None => format!("entity_{}", name),
            };
            (name, id)
        })
        .collect();

    for node in &nodes {
        if node.data.node_type != "tab" {
            continue;
        }
        let Some(tab_entities) = &node.data.entities else { continue };
        for entity in tab_entities {
            if let Some(target) = entity_node_id.get(entity) {
                edges.push(GraphEdge {
                    data: EdgeData {
                        id: format!("edge_{}_{}", node.data.id, target),
                        source: node.data.id.clone(),
                        target: target.clone(),
                        edge_type: "references",
                        weight: REFERENCES_WEIGHT,
                        predicate: None,
                        confidence: None,
                    },
                });
            }
        }
    }

    // Entity-entity relationship edges from the triplet store, truncated.
    let mut relationship_edges = 0;
    for triplet in triplets::between_names(db, &entity_names)? {
        if relationship_edges >= options.max_relationship_edges {
            break;
        }
        let (Some(source), Some(target)) = (
            entity_node_id.get(&triplet.subject_name),
            entity_node_id.get(&triplet.object_name),
        ) else {
            continue;
        };
        edges.push(GraphEdge {
            data: EdgeData {
                id: format!("edge_rel_{}", triplet.id.unwrap_or_default()),
                source: source.clone(),
                target: target.clone(),
                edge_type: "related",
                weight: REFERENCES_WEIGHT,
                predicate: Some(triplet.predicate.clone()),
                confidence: Some(triplet.confidence),
            },
        });
        relationship_edges += 1;
    }

    Ok(GraphVisualization {
        timestamp: now,
        metadata: VizMetadata {
            cluster_count,
            tab_count,
            entity_count: entity_names.len(),
            min_cluster_size: min_size,
            include_singletons: options.include_singletons,
            time_range_hours: options.time_range_hours,
        },
        nodes,
        edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TabCluster;
    use tabgraph_core::{Tab, TemporalValidity, Triplet};
    use tabgraph_db::pool::test_pool;
    use tabgraph_db::queries::{entities as entity_queries, links, tabs, triplets as triplet_queries};

    fn tab(id: i64, entities: &[&str]) -> Tab {
        let mut tab = Tab::new(id, format!("https://t/{}", id), format!("Tab {}", id));
        tab.entities = entities.iter().map(|e| e.to_string()).collect();
        tab
    }

    fn cluster_with(id: &str, tabs: Vec<Tab>) -> TabCluster {
        let mut cluster = TabCluster::new(id.to_string(), ClusterColor::Blue);
        cluster.name = format!("Cluster {}", id);
        for tab in tabs {
            cluster.add_tab(tab);
        }
        cluster
    }

    fn persist_tab(pool: &tabgraph_db::DbPool, tab: &Tab) {
        tabs::upsert(pool, tab).unwrap();
        for name in &tab.entities {
            let entity_id =
                entity_queries::upsert(pool, &tabgraph_core::Entity::concept(name.as_str())).unwrap();
            links::link(pool, tab.id, entity_id).unwrap();
        }
    }

    #[test]
    fn assembles_nodes_and_edges_with_min_size_filter() {
        let pool = test_pool();
        let t1 = tab(1, &["Neo4j"]);
        let t2 = tab(2, &["Neo4j"]);
        let t3 = tab(3, &["React"]);
        for t in [&t1, &t2, &t3] {
            persist_tab(&pool, t);
        }

        let clusters = vec![
            cluster_with("a", vec![t1, t2]),
            cluster_with("b", vec![t3]),
        ];

        let viz = build_visualization(&pool, &clusters, &VizOptions::default()).unwrap();

        // Singleton cluster filtered out by default.
        assert_eq!(viz.metadata.cluster_count, 1);
        assert_eq!(viz.metadata.tab_count, 2);
        assert_eq!(viz.metadata.entity_count, 1);

        let cluster_nodes: Vec<_> = viz
            .nodes
            .iter()
            .filter(|n| n.data.node_type == "cluster")
            .collect();
        assert_eq!(cluster_nodes.len(), 1);

        let contains: Vec<_> = viz
            .edges
            .iter()
            .filter(|e| e.data.edge_type == "contains")
            .collect();
        assert_eq!(contains.len(), 2);

        let references: Vec<_> = viz
            .edges
            .iter()
            .filter(|e| e.data.edge_type == "references")
            .collect();
        assert_eq!(references.len(), 2);

        // Tab nodes are associated with their cluster via a plain field.
        let tab_node = viz
            .nodes
            .iter()
            .find(|n| n.data.id == "tab_1")
            .unwrap();
        assert_eq!(tab_node.data.cluster_id.as_deref(), Some("a"));
    }

    #[test]
    fn include_singletons_overrides_min_size() {
        let pool = test_pool();
        let t1 = tab(1, &[]);
        persist_tab(&pool, &t1);
        let clusters = vec![cluster_with("a", vec![t1])];

        let options = VizOptions {
            include_singletons: true,
            ..VizOptions::default()
        };
        let viz = build_visualization(&pool, &clusters, &options).unwrap();
        assert_eq!(viz.metadata.cluster_count, 1);
    }

    #[test]
    fn entity_nodes_carry_contexts_and_triplet_edges_are_bounded() {
        let pool = test_pool();
        let t1 = tab(1, &["React", "JavaScript"]);
        let t2 = tab(2, &["React", "JavaScript"]);
        persist_tab(&pool, &t1);
        persist_tab(&pool, &t2);

        let react = entity_queries::get_by_name(&pool, "React", None).unwrap().unwrap();
        let js = entity_queries::get_by_name(&pool, "JavaScript", None).unwrap().unwrap();
        tabgraph_db::queries::contexts::upsert(&pool, react.id.unwrap(), 1, "UI library here.")
            .unwrap();

        triplet_queries::insert(
            &pool,
            &Triplet {
                id: None,
                subject_id: react.id.unwrap(),
                subject_name: "React".to_string(),
                predicate: "builds_on".to_string(),
                object_id: js.id.unwrap(),
                object_name: "JavaScript".to_string(),
                temporal_validity: TemporalValidity::default(),
                confidence: 0.8,
                source: None,
                created_at: Utc::now(),
            },
        )
        .unwrap();

        let clusters = vec![cluster_with("a", vec![t1, t2])];
        let viz = build_visualization(&pool, &clusters, &VizOptions::default()).unwrap();

        let react_node = viz
            .nodes
            .iter()
            .find(|n| n.data.node_type == "entity" && n.data.label == "React")
            .unwrap();
        let contexts = react_node.data.tab_contexts.as_ref().unwrap();
        assert_eq!(contexts[&1], "UI library here.");

        let related: Vec<_> = viz
            .edges
            .iter()
            .filter(|e| e.data.edge_type == "related")
            .collect();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].data.predicate.as_deref(), Some("builds_on"));
        assert_eq!(related[0].data.confidence, Some(0.8));

        // A zero cap removes relationship edges entirely.
        let capped = VizOptions {
            max_relationship_edges: 0,
            ..VizOptions::default()
        };
        let viz = build_visualization(&pool, &clusters, &capped).unwrap();
        assert!(viz.edges.iter().all(|e| e.data.edge_type != "related"));
    }

    #[test]
    fn recency_window_filters_old_tabs() {
        let pool = test_pool();
        let mut old_tab = tab(1, &[]);
        old_tab.opened_at = Utc::now() - Duration::hours(48);
        let fresh_one = tab(2, &[]);
        let fresh_two = tab(3, &[]);
        for t in [&old_tab, &fresh_one, &fresh_two] {
            persist_tab(&pool, t);
        }

        let clusters = vec![cluster_with("a", vec![old_tab, fresh_one, fresh_two])];
        let options = VizOptions {
            time_range_hours: Some(24),
            ..VizOptions::default()
        };
        let viz = build_visualization(&pool, &clusters, &options).unwrap();
        assert_eq!(viz.metadata.tab_count, 2);
    }
}
