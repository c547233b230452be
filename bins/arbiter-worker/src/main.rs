mod config;
mod engine;
mod evaluator;
mod executor;
mod recovery;
mod store;

use arbiter_common::redis;
use config::WorkerSettings;
use engine::{ExecutionEngine, HttpEngine};
use std::sync::Arc;
use store::{RedisStore, SubmissionStore};
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if arbiter_common::config::json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Arbiter Worker booting...");

    let settings = WorkerSettings::from_env();
    info!(
        executor = %settings.executor_url,
        concurrency = settings.concurrency,
        stale_after_secs = settings.stale_after.as_secs(),
        "Worker configured"
    );

    let client = ::redis::Client::open(settings.redis_url.as_str())?;
    let store_conn = ::redis::aio::ConnectionManager::new(client.clone()).await?;
    info!("Connected to Redis: {}", settings.redis_url);

    let store: Arc<dyn SubmissionStore> = Arc::new(RedisStore::new(store_conn.clone()));
    let engine: Arc<dyn ExecutionEngine> =
        Arc::new(HttpEngine::new(&settings.executor_url, settings.executor_timeout)?);

    let mut tasks = JoinSet::new();

    tasks.spawn(recovery::recovery_loop(
        store_conn,
        settings.stale_after,
        settings.recovery_interval,
    ));

    for worker_id in 0..settings.concurrency {
        // BLPOP parks the connection, so each loop owns one
        let queue_conn = ::redis::aio::ConnectionManager::new(client.clone()).await?;
        tasks.spawn(worker_loop(worker_id, queue_conn, store.clone(), engine.clone()));
    }

    tokio::select! {
        _ = signal::ctrl_c() => {
            warn!("Received shutdown signal, stopping workers...");
        }
        Some(res) = tasks.join_next() => {
            if let Err(e) = res {
                error!(error = %e, "Worker task exited unexpectedly");
            }
        }
    }

    // In-flight submissions stay Pending and are picked up again by recovery
    tasks.shutdown().await;

    info!("Worker shutdown complete");
    Ok(())
}

#[instrument(skip(queue_conn, store, engine))]
async fn worker_loop(
    worker_id: usize,
    mut queue_conn: ::redis::aio::ConnectionManager,
    store: Arc<dyn SubmissionStore>,
    engine: Arc<dyn ExecutionEngine>,
) {
    loop {
        // BLPOP with 5 second timeout
        match redis::pop_job(&mut queue_conn, 5.0).await {
            Ok(Some(job)) => {
                let submission_id = job.submission_id;
                info!(submission_id = %submission_id, "Received job");

                let start = std::time::Instant::now();
                match executor::judge_submission(store.as_ref(), engine.as_ref(), submission_id).await {
                    Ok(Some(verdict)) => {
                        info!(
                            submission_id = %submission_id,
                            status = %verdict.status,
                            execution_ms = start.elapsed().as_millis() as u64,
                            "Submission judged"
                        );
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // Left Pending; the recovery sweep re-queues it
                        error!(submission_id = %submission_id, error = %e, "Failed to judge submission");
                    }
                }
            }
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}
