//! Entity re-enrichment handler.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tabgraph_cluster::EnrichmentWorker;
use tabgraph_db::queries::contexts;

use crate::routes::internal_error;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReEnrichRequest {
    /// Re-enrich every pair, not only those lacking a context.
    #[serde(default)]
    pub force: bool,
}

#[derive(Serialize)]
pub struct ReEnrichResponse {
    pub status: &'static str,
    pub pairs: usize,
}

/// Queue context enrichment for `(entity, tab)` pairs lacking one, or
/// for all pairs when `force` is set. Runs in the background.
pub async fn re_enrich(
    State(state): State<AppState>,
    Json(request): Json<ReEnrichRequest>,
) -> Result<Json<ReEnrichResponse>, (StatusCode, String)> {
    let pairs = if request.force {
        contexts::all_pairs(state.pipeline.db()).map_err(internal_error)?
    } else {
        contexts::pairs_missing(state.pipeline.db()).map_err(internal_error)?
    };

    let queued = pairs.len();
    EnrichmentWorker::spawn_pairs(state.settings.as_ref().clone(), pairs);

    Ok(Json(ReEnrichResponse {
        status: "queued",
        pairs: queued,
    }))
}
