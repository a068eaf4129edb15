//! Server command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use tabgraph_agents::{
    provider_from_settings, AgentClient, ClusterNamer, EmbeddingClient, EntityExtractor,
    LlmClient, TabSummarizer,
};
use tabgraph_cluster::{ClusterEngine, IngestPipeline};
use tabgraph_core::Settings;
use tabgraph_web::state::AppState;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, default_value = "8000")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Database path (overrides TABGRAPH_DB_PATH)
    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let mut settings = Settings::from_env()?;
    if let Some(db_path) = args.db_path {
        settings.db_path = db_path;
    }

    let db = tabgraph_db::init_pool(&settings.db_path)?;

    let llm = LlmClient::new(
        &settings.openai_base_url,
        &settings.openai_api_key,
        &settings.llm_model,
    );
    let embedder = EmbeddingClient::new(
        &settings.openai_base_url,
        &settings.openai_api_key,
        &settings.embedding_model,
    );
    let agent = AgentClient::new(
        &settings.agent_base_url,
        &settings.search_base_url,
        &settings.you_api_key,
    );

    let engine = ClusterEngine::new(
        db.clone(),
        ClusterNamer::new(llm.clone()),
        settings.similarity_threshold,
        settings.rename_threshold,
        settings.entity_weight,
    );
    let extractor = EntityExtractor::new(llm);
    let summarizer = TabSummarizer::new(provider_from_settings(&settings, agent.clone()));

    let pipeline = Arc::new(IngestPipeline::new(
        db,
        engine,
        embedder,
        extractor,
        summarizer,
        settings.clone(),
    ));
    let state = AppState::new(pipeline, agent, settings);

    println!(
        "{} Starting TabGraph server on {}:{}",
        "→".blue().bold(),
        args.host,
        args.port
    );
    println!();
    println!("  Health: http://{}:{}/health", args.host, args.port);
    println!("  API:    http://{}:{}/api", args.host, args.port);
    println!();
    println!("{}", "Press Ctrl+C to stop".dimmed());

    tabgraph_web::run_server(state, &args.host, args.port).await?;

    Ok(())
}
