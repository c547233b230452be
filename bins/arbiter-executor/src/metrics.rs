// Prometheus metrics for the executor

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    pub static ref RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "arbiter_executor_runs_total",
        "Execution jobs by language and outcome",
        &["language", "outcome"]
    )
    .expect("metric can be registered");
    pub static ref RUN_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "arbiter_executor_run_duration_seconds",
        "Wall time of a full stage/compile/run/release cycle",
        &["language"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("metric can be registered");
    pub static ref RELEASE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "arbiter_executor_release_failures_total",
        "Workspaces that could not be removed after a job"
    )
    .expect("metric can be registered");
}

/// Render the default registry in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
