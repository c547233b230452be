/// Execution Engine - how the worker reaches the executor
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to get code executed (the executor's `/run`)
/// - Engine does NOT know verdict rules
/// - Engine returns the raw `{success, output}` for the Evaluator to judge
///
/// Transport failures and non-2xx answers are errors here; the orchestrator
/// turns them into a `Runtime Error` verdict for the test case at hand.

use anyhow::{bail, Context, Result};
use arbiter_common::types::{RunRequest, RunResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn run(&self, language: &str, code: &str, input: &str) -> Result<RunResponse>;
}

/// Calls the executor service over HTTP
pub struct HttpEngine {
    client: Client,
    base_url: String,
}

impl HttpEngine {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ExecutionEngine for HttpEngine {
    async fn run(&self, language: &str, code: &str, input: &str) -> Result<RunResponse> {
        let url = format!("{}/run", self.base_url);
        let request = RunRequest {
            language: language.to_string(),
            code: Some(code.to_string()),
            input: input.to_string(),
        };

        debug!(url = %url, language = %language, input_size = input.len(), "Calling executor");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to reach executor")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Executor returned {}: {}", status, body);
        }

        response
            .json::<RunResponse>()
            .await
            .context("Failed to parse executor response")
    }
}
