mod config;
mod executor;
mod handlers;
mod metrics;
mod routes;
mod runner;
mod staging;

use anyhow::Context;
use axum::Router;
use config::{ExecutorSettings, LanguageConfigManager};
use executor::ExecutionService;
use staging::StagingArea;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

pub struct AppState {
    pub service: ExecutionService,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if arbiter_common::config::json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Arbiter executor booting...");

    let settings = ExecutorSettings::from_env();

    let languages = LanguageConfigManager::load_or_default(&settings.languages_config)
        .context("Failed to load language configurations")?;
    info!("Loaded toolchains for: {:?}", languages.list_languages());

    let staging = StagingArea::new(&settings.staging_dir)
        .await
        .with_context(|| format!("Failed to create staging root {}", settings.staging_dir.display()))?;
    info!(
        staging_dir = %settings.staging_dir.display(),
        max_concurrent_runs = settings.max_concurrent_runs,
        run_timeout_ms = settings.limits.run_timeout.as_millis() as u64,
        compile_timeout_ms = settings.limits.compile_timeout.as_millis() as u64,
        "Execution limits configured"
    );

    let service = ExecutionService::new(
        staging,
        languages,
        settings.limits,
        settings.max_concurrent_runs,
    );
    let state = Arc::new(AppState { service });

    let app = Router::new()
        .merge(routes::routes())
        .with_state(state);

    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind_addr))?;

    info!("Compiler server listening on {}", settings.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Received shutdown signal, finishing in-flight runs...");
        })
        .await
        .context("Server error")?;

    info!("Executor shutdown complete");
    Ok(())
}
