//! TabGraph HTTP facade.
//!
//! A thin axum layer over the ingest pipeline, the cluster engine
//! snapshot and the graph store. CORS admits the browser extension and
//! localhost origins only.

pub mod routes;
pub mod state;

use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _request_parts| {
                let origin = origin.to_str().unwrap_or_default();
                origin.starts_with("chrome-extension://")
                    || origin.starts_with("moz-extension://")
                    || origin.starts_with("http://localhost")
                    || origin.starts_with("http://127.0.0.1")
            },
        ))
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/tabs/ingest", post(routes::tabs::ingest))
        .route("/tabs/delete", post(routes::tabs::delete))
        .route("/tabs/clusters", get(routes::tabs::clusters))
        .route("/graph/visualization", get(routes::graph::visualization))
        .route("/recommendations", get(routes::recommendations::recommendations))
        .route("/entities/re-enrich", post(routes::entities::re_enrich))
        .with_state(state);

    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Run the web server.
pub async fn run_server(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("TabGraph server listening on http://{}:{}", host, port);

    axum::serve(listener, app).await?;
    Ok(())
}
