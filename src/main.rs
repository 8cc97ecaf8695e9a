use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

mod chart;
mod config;
mod db;
mod llm;
mod pipeline;
mod prompts;
mod relational;
mod search;
#[cfg(test)]
mod testing;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::db::db_pool::DuckDBConnectionManager;
use crate::db::DuckChatStore;
use crate::llm::LlmManager;
use crate::pipeline::PipelineDeps;
use crate::relational::{DuckRelationalSource, RelationalSource};
use crate::search::SearchClient;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_tracing(args.log_json);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Initializing chat store at {}",
        config.database.connection_string
    );
    let pool = DuckDBConnectionManager::new(config.database.connection_string.clone())?
        .into_pool(config.database.pool_size as u32)?;
    let store = DuckChatStore::new(pool)?;

    // Initialize LLM manager
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm = Arc::new(LlmManager::new(&config.llm)?);

    let search = SearchClient::new(&config.search)?;
    if !search.is_configured() {
        warn!("ELASTICSEARCH_URL is not set; chat requests that produce a search query will fail");
    }

    let relational: Option<Arc<dyn RelationalSource>> = if config.relational.enabled {
        info!("Database search enabled, opening {}", config.relational.path);
        Some(Arc::new(DuckRelationalSource::open(
            &config.relational.path,
            llm.clone(),
        )?))
    } else {
        None
    };

    let pipeline = PipelineDeps {
        llm,
        search: Arc::new(search),
        store: Arc::new(store),
        relational,
        database_search: config.relational.enabled,
    };
    let templates = web::templates::init_templates()?;
    let app_state = Arc::new(AppState::new(config.clone(), pipeline, templates));

    // Start the web server
    info!("Starting nl-search server on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
