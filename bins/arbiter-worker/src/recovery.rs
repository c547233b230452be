// Re-queues submissions left in Pending by a worker that died mid-judgement

use anyhow::Result;
use arbiter_common::redis;
use chrono::Utc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Push every pending submission idle for longer than `stale_after` back onto the queue.
///
/// Judging resumes from the stored cursor, so already-passed test cases are not re-run.
pub async fn requeue_stale(
    conn: &mut ::redis::aio::ConnectionManager,
    stale_after: Duration,
) -> Result<usize> {
    let cutoff = Utc::now() - chrono::Duration::from_std(stale_after)?;
    let stale = redis::stale_pending(conn, cutoff).await?;

    for id in &stale {
        redis::requeue(conn, id).await?;
        warn!(submission_id = %id, "Re-queued stale pending submission");
    }

    Ok(stale.len())
}

pub async fn recovery_loop(
    mut conn: ::redis::aio::ConnectionManager,
    stale_after: Duration,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        // First tick completes immediately, covering startup recovery
        ticker.tick().await;
        match requeue_stale(&mut conn, stale_after).await {
            Ok(0) => {}
            Ok(count) => info!(count, "Recovery sweep re-queued submissions"),
            Err(e) => error!(error = %e, "Recovery sweep failed"),
        }
    }
}
