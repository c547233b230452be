// Prometheus metrics for the API

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    pub static ref SUBMISSIONS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "arbiter_api_submissions_created_total",
        "Submissions accepted for judging, by requested language",
        &["language"]
    )
    .expect("metric can be registered");
    pub static ref RUN_PROXY_TOTAL: IntCounterVec = register_int_counter_vec!(
        "arbiter_api_run_proxy_total",
        "Custom-input runs forwarded to the executor",
        &["outcome"]
    )
    .expect("metric can be registered");
}

pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
