mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod routes;
mod state;
mod tailoring;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, StoreBackend};
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::models::usage::LimitsTable;
use crate::routes::build_router;
use crate::state::AppState;
use crate::tailoring::backoff::BackoffPolicy;
use crate::tailoring::orchestrator::{ProviderEntry, TailoringOrchestrator};
use crate::tailoring::pg_store::{PgProgressStore, PgResultStore, PgUsageStore};
use crate::tailoring::progress::ProgressTracker;
use crate::tailoring::quota::QuotaLedger;
use crate::tailoring::store::{
    MemoryProgressStore, MemoryResultStore, MemoryUsageStore, ProgressStore, TailoredResultStore,
    UsageStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor API v{}", env!("CARGO_PKG_VERSION"));
    for name in &config.skipped_providers {
        warn!("Provider '{name}' listed in PROVIDER_PRIORITY has no API key; skipping");
    }

    // Initialize stores
    let (progress, usage, results) = build_stores(&config).await?;

    // Initialize providers in fallback order
    let providers: Vec<ProviderEntry> = config
        .providers
        .iter()
        .map(|settings| {
            info!(
                "Provider {} initialized (model: {}, attempts: {}, timeout: {}s)",
                settings.config.name(),
                settings.config.model(),
                settings.max_attempts,
                settings.timeout.as_secs()
            );
            ProviderEntry {
                generator: Arc::new(LlmClient::new(settings.config.clone(), settings.timeout)),
                policy: BackoffPolicy::new(settings.max_attempts - 1, settings.initial_backoff),
            }
        })
        .collect();

    let stale_after = chrono::Duration::from_std(config.progress_stale_after)
        .context("PROGRESS_STALE_AFTER_SECS is out of range")?;
    let tailoring = TailoringOrchestrator::new(
        providers,
        QuotaLedger::new(usage, LimitsTable::default()),
        ProgressTracker::new(progress, config.max_attempts, stale_after),
        results,
    );
    info!(
        "Tailoring orchestrator ready (providers: {})",
        tailoring.provider_names().join(" → ")
    );

    // Build app state
    let state = AppState { tailoring };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS once the web origin is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

type Stores = (
    Arc<dyn ProgressStore>,
    Arc<dyn UsageStore>,
    Arc<dyn TailoredResultStore>,
);

/// Picks Postgres or in-memory adapters for every store.
async fn build_stores(config: &Config) -> Result<Stores> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let pool = create_pool(url).await?;
            Ok((
                Arc::new(PgProgressStore::new(pool.clone())),
                Arc::new(PgUsageStore::new(pool.clone())),
                Arc::new(PgResultStore::new(pool)),
            ))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory stores; progress and quotas are lost on restart");
            Ok((
                Arc::new(MemoryProgressStore::new()),
                Arc::new(MemoryUsageStore::new()),
                Arc::new(MemoryResultStore::new()),
            ))
        }
    }
}
