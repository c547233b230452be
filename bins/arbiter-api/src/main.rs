mod handlers;
mod metrics;
mod proxy;
mod routes;
mod store;

use anyhow::Context;
use arbiter_common::config::{env_or, executor_url, redis_url};
use axum::Router;
use proxy::ExecutorClient;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use store::{RedisRepository, SubmissionRepository};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

pub struct AppState {
    pub store: Arc<dyn SubmissionRepository>,
    pub executor: ExecutorClient,
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

    info!("Arbiter API booting...");

    let redis_url = redis_url();
    let client = redis::Client::open(redis_url.as_str()).context("Invalid REDIS_URL")?;
    let redis_conn = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    info!("Connected to Redis: {}", redis_url);

    let executor_url = executor_url();
    let executor = ExecutorClient::new(&executor_url, Duration::from_secs(60))?;
    info!("Forwarding custom runs to {}", executor_url);

    let state = Arc::new(AppState {
        store: Arc::new(RedisRepository::new(redis_conn)),
        executor,
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let addr = env_or("API_ADDR", "0.0.0.0:3000");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            warn!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    info!("API shutdown complete");
    Ok(())
}
