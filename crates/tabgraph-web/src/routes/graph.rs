//! Graph visualization handler.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tabgraph_cluster::{build_visualization, GraphVisualization, VizOptions};

use crate::routes::internal_error;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct VizParams {
    #[serde(default)]
    pub include_singletons: Option<bool>,
    #[serde(default)]
    pub time_range_hours: Option<i64>,
    #[serde(default)]
    pub min_cluster_size: Option<usize>,
}

pub async fn visualization(
    State(state): State<AppState>,
    Query(params): Query<VizParams>,
) -> Result<Json<GraphVisualization>, (StatusCode, String)> {
    let defaults = VizOptions::default();
    let options = VizOptions {
        include_singletons: params.include_singletons.unwrap_or(defaults.include_singletons),
        time_range_hours: params.time_range_hours,
        min_cluster_size: params.min_cluster_size.unwrap_or(defaults.min_cluster_size),
        max_relationship_edges: defaults.max_relationship_edges,
    };

    let clusters = state.pipeline.clusters_snapshot().await;
    let viz = build_visualization(state.pipeline.db(), &clusters, &options)
        .map_err(internal_error)?;

    Ok(Json(viz))
}
