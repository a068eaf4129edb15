//! TabGraph clustering core.
//!
//! The in-memory cluster engine, the ingest pipeline that reconciles
//! browser snapshots against it and the graph store, the background
//! enrichment worker, and the visualization assembler.
//!
//! Clusters are process-resident state: they are rebuilt from the
//! incoming tab set after a restart, only the graph store persists.

pub mod engine;
pub mod model;
pub mod pipeline;
pub mod viz;
pub mod worker;

pub use engine::{cosine_similarity, jaccard_similarity, ClusterEngine, ClusterStats};
pub use model::{ClusterColor, TabCluster, PLACEHOLDER_NAME};
pub use pipeline::{IngestOutcome, IngestPipeline, TabCachePayload};
pub use viz::{build_visualization, GraphVisualization, VizOptions};
pub use worker::EnrichmentWorker;
