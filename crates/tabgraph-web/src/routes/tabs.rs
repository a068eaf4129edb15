//! Tab ingest, delete and cluster snapshot handlers.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabgraph_cluster::{ClusterColor, TabCachePayload, TabCluster};
use tabgraph_core::{Tab, TabEdge};
use tabgraph_db::queries::relationships;

use crate::routes::internal_error;
use crate::state::AppState;

/// One tab as posted by the browser extension.
#[derive(Deserialize)]
pub struct TabPayload {
    pub id: i64,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub favicon_url: Option<String>,
    #[serde(default)]
    pub window_id: Option<i64>,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub important: bool,
    /// Cached embedding from a previous ingest response.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Cached entities from a previous ingest response.
    #[serde(default)]
    pub entities: Option<Vec<String>>,
}

impl TabPayload {
    fn into_tab(self) -> Tab {
        let mut tab = Tab::new(self.id, self.url, self.title);
        tab.favicon_url = self.favicon_url;
        tab.window_id = self.window_id;
        tab.group_id = self.group_id;
        tab.important = self.important;
        tab.embedding = self.embedding;
        tab.entities = self.entities.unwrap_or_default();
        tab
    }
}

#[derive(Deserialize)]
pub struct IngestRequest {
    pub tabs: Vec<TabPayload>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub processed: usize,
    pub important_tabs: usize,
    pub session_id: String,
    pub tab_data: Vec<TabCachePayload>,
}

pub async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, (StatusCode, String)> {
    let ingested_at = request.timestamp.unwrap_or_else(Utc::now);
    let batch: Vec<Tab> = request.tabs.into_iter().map(TabPayload::into_tab).collect();

    let outcome = state
        .pipeline
        .ingest(batch, ingested_at)
        .await
        .map_err(internal_error)?;

    Ok(Json(IngestResponse {
        status: "success",
        processed: outcome.processed,
        important_tabs: outcome.important_tabs,
        session_id: outcome.session_id,
        tab_data: outcome.tab_data,
    }))
}

#[derive(Deserialize)]
pub struct DeleteRequest {
    pub tab_ids: Vec<i64>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub deleted: usize,
}

pub async fn delete(
    State(state): State<AppState>,
    Json(request): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, (StatusCode, String)> {
    let deleted = state
        .pipeline
        .delete_tabs(&request.tab_ids)
        .await
        .map_err(internal_error)?;

    Ok(Json(DeleteResponse {
        status: "success",
        deleted,
    }))
}

#[derive(Serialize)]
pub struct TabView {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub label: Option<String>,
    pub summary: Option<String>,
    pub display_label: Option<String>,
    pub important: bool,
    pub entities: Vec<String>,
}

#[derive(Serialize)]
pub struct ClusterView {
    pub id: String,
    pub name: String,
    pub color: ClusterColor,
    pub tab_count: usize,
    pub shared_entities: Vec<String>,
    pub tabs: Vec<TabView>,
}

impl ClusterView {
    fn from_cluster(cluster: &TabCluster) -> Self {
        Self {
            id: cluster.id.clone(),
            name: cluster.name.clone(),
            color: cluster.color,
            tab_count: cluster.tab_count(),
            shared_entities: cluster.shared_entities.clone(),
            tabs: cluster
                .tabs
                .iter()
                .map(|tab| TabView {
                    id: tab.id,
                    url: tab.url.clone(),
                    title: tab.title.clone(),
                    label: tab.label.clone(),
                    summary: tab.summary.clone(),
                    display_label: tab.display_label.clone(),
                    important: tab.important,
                    entities: tab.entities.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct ClustersResponse {
    pub clusters: Vec<ClusterView>,
    pub relationships: Vec<TabEdge>,
}

/// Snapshot of clusters holding two or more tabs.
pub async fn clusters(
    State(state): State<AppState>,
) -> Result<Json<ClustersResponse>, (StatusCode, String)> {
    let clusters: Vec<ClusterView> = state
        .pipeline
        .clusters_snapshot()
        .await
        .iter()
        .filter(|c| c.tab_count() >= 2)
        .map(ClusterView::from_cluster)
        .collect();

    let relationships =
        relationships::list_all(state.pipeline.db(), 0.0).map_err(internal_error)?;

    Ok(Json(ClustersResponse {
        clusters,
        relationships,
    }))
}
