//! TabGraph core types.
//!
//! Domain models shared by every crate in the workspace, the central
//! error type, and configuration loading.

pub mod config;
pub mod error;
pub mod models;

pub use config::Settings;
pub use error::{TabGraphError, TabGraphResult};
pub use models::{
    Entity, Tab, TabEdge, TabMetadata, TabRelationship, TemporalValidity, Triplet, ENTITY_TYPES,
};
