// Forwards custom-input runs to the executor service

use anyhow::{bail, Context, Result};
use arbiter_common::types::{RunRequest, RunResponse};
use reqwest::Client;
use std::time::Duration;

#[derive(Clone)]
pub struct ExecutorClient {
    client: Client,
    base_url: String,
}

impl ExecutorClient {
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

    pub async fn run(&self, request: &RunRequest) -> Result<RunResponse> {
        let response = self
            .client
            .post(format!("{}/run", self.base_url))
            .json(request)
            .send()
            .await
            .context("Failed to reach executor")?;

        if !response.status().is_success() {
            bail!("Executor returned {}", response.status());
        }

        response
            .json::<RunResponse>()
            .await
            .context("Failed to parse executor response")
    }
}
