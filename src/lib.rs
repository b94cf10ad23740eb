pub mod analysis;
pub mod commands;
pub mod config;
pub mod core;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod llm;
pub mod models;

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use crate::config::AppConfig;
pub use crate::core::orchestrator::InsightClient;
pub use crate::dashboard::Dashboard;
pub use crate::error::{InsightError, Result};
pub use crate::fetcher::stores::StoreDirectory;
pub use crate::fetcher::ApiTransport;

const DEFAULT_LOG_FILTER: &str = "store_insights_lib=info,insight_cli=info";

/// Install the fmt subscriber. `RUST_LOG` overrides the default filter. Safe to call twice.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Everything the command layer needs, built once per process.
pub struct AppState {
    pub config: AppConfig,
    pub pool: SqlitePool,
    pub client: Arc<InsightClient>,
    pub stores: StoreDirectory,
    pub dashboard: Dashboard,
}

impl AppState {
    /// Open the settings database and wire the HTTP transport from `config`.
    pub async fn init(config: AppConfig) -> Result<Self> {
        let pool = db::init(&config.db_path).await?;
        info!(db = %config.db_path.display(), api = %config.api_base, "Database initialized");
        let client = Arc::new(InsightClient::from_config(&config));
        Ok(Self::assemble(config, pool, client))
    }

    /// Same wiring over a caller-provided transport and pool.
    pub fn with_transport(config: AppConfig, pool: SqlitePool, transport: Arc<dyn ApiTransport>) -> Self {
        let client = Arc::new(InsightClient::new(transport, config.explain_cache_ttl));
        Self::assemble(config, pool, client)
    }

    fn assemble(config: AppConfig, pool: SqlitePool, client: Arc<InsightClient>) -> Self {
        let stores = StoreDirectory::new(
            client.transport(),
            pool.clone(),
            config.store_query.clone(),
            config.stores_cache_ttl,
        );
        let dashboard = Dashboard::new(client.clone(), pool.clone(), config.category_top_n);
        Self { config, pool, client, stores, dashboard }
    }
}
