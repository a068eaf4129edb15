//! Recommendations pass-through to the external agent.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tabgraph_cluster::ClusterEngine;
use tracing::warn;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct RecommendationParams {
    #[serde(default)]
    pub cluster_id: Option<String>,
}

#[derive(Serialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<String>,
}

/// Ask the agent for content suggestions, with cluster context when a
/// cluster id is given. Stateless: nothing is persisted.
pub async fn recommendations(
    State(state): State<AppState>,
    Query(params): Query<RecommendationParams>,
) -> Result<Json<RecommendationsResponse>, (StatusCode, String)> {
    let clusters = state.pipeline.clusters_snapshot().await;
    let cluster = params
        .cluster_id
        .as_deref()
        .and_then(|id| clusters.iter().find(|c| c.id == id));

    let prompt = match cluster {
        Some(cluster) => {
            let hubs = ClusterEngine::hub_entities(cluster, 3);
            let titles: Vec<String> = cluster.titles().into_iter().take(5).collect();
            format!(
                "A user is browsing a group of tabs called \"{}\".\n\
                 Open tabs:\n{}\n\
                 Key topics: {}\n\n\
                 Suggest 3-5 high-quality web resources (articles, docs, tools) this user \
                 would find useful next. Return one suggestion per line, no numbering.",
                cluster.name,
                titles
                    .iter()
                    .map(|t| format!("- {}", t))
                    .collect::<Vec<_>>()
                    .join("\n"),
                hubs.join(", "),
            )
        }
        None => "Suggest 3-5 high-quality web resources for a user researching their \
                 currently open browser tabs. Return one suggestion per line, no numbering."
            .to_string(),
    };

    let recommendations = match state.agent.express_agent(&prompt).await {
        Ok(answer) => parse_recommendations(&answer),
        Err(e) => {
            warn!(error = %e, "Recommendation agent call failed");
            Vec::new()
        }
    };

    Ok(Json(RecommendationsResponse { recommendations }))
}

/// One recommendation per non-empty line, bullets stripped.
fn parse_recommendations(answer: &str) -> Vec<String> {
    answer
        .lines()
        .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bulleted_lines() {
        let answer = "- React docs\n* Vue guide\n\n• Angular tour\nplain line";
        assert_eq!(
            parse_recommendations(answer),
            vec!["React docs", "Vue guide", "Angular tour", "plain line"]
        );
    }

    #[test]
    fn empty_answer_is_empty_list() {
        assert!(parse_recommendations("").is_empty());
        assert!(parse_recommendations("\n\n").is_empty());
    }
}
