// Worker settings, read once at startup
use arbiter_common::config::{env_parse, executor_url, redis_url};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub redis_url: String,
    pub executor_url: String,
    /// Submissions judged in parallel by this process
    pub concurrency: usize,
    /// Per-request limit on executor calls; must exceed the executor's own compile + run limits
    pub executor_timeout: Duration,
    /// A pending submission without progress for this long is considered abandoned
    pub stale_after: Duration,
    pub recovery_interval: Duration,
}

impl WorkerSettings {
    pub fn from_env() -> Self {
        Self {
            redis_url: redis_url(),
            executor_url: executor_url(),
            concurrency: env_parse("WORKER_CONCURRENCY", 4usize).max(1),
            executor_timeout: Duration::from_secs(env_parse("EXECUTOR_TIMEOUT_SECS", 60)),
            stale_after: Duration::from_secs(env_parse("STALE_AFTER_SECS", 300)),
            recovery_interval: Duration::from_secs(env_parse("RECOVERY_INTERVAL_SECS", 60).max(1)),
        }
    }
}
