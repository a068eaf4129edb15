//! TabGraph external-service clients.
//!
//! HTTP clients for the embedding and LLM provider, the search/agent
//! provider, and the services built on them: entity extraction, entity
//! enrichment, cluster naming and tab metadata generation.
//!
//! Every service here degrades rather than fails: parse errors and
//! exhausted retries yield empty records or deterministic fallbacks so
//! that clustering never blocks on an external API.

pub mod agent_client;
pub mod embedding;
pub mod enricher;
pub mod extractor;
pub mod llm;
pub mod metadata;
pub mod naming;
pub mod summarizer;

pub use agent_client::AgentClient;
pub use embedding::EmbeddingClient;
pub use enricher::{Enrichment, EnrichmentContext, EntityEnricher};
pub use extractor::EntityExtractor;
pub use llm::LlmClient;
pub use metadata::MetadataProvider;
pub use naming::ClusterNamer;
pub use summarizer::{provider_from_settings, TabSummarizer};
