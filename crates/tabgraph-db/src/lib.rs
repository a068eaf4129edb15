//! TabGraph persistence layer.
//!
//! SQLite-backed store for the knowledge graph: entities, tabs,
//! tab-entity links, materialized tab-tab edges, per-tab entity
//! contexts and temporal triplets. The store is the system's source of
//! durable truth; the in-memory cluster set is rebuilt from it on
//! restart.

pub mod migrations;
pub mod pool;
pub mod queries;
pub mod vector;

pub(crate) mod time;

pub use migrations::run_migrations;
pub use pool::{init_pool, DbError, DbPool, DbResult};
