/// Execution Service - one `/run` request, start to finish
///
/// **Responsibility:**
/// Validate the request, stage it, dispatch to the language runner and
/// release the workspace before answering.
///
/// Classified failures (compile, runtime, timeout) are ordinary results with
/// `success: false`. Only malformed requests and executor faults are errors.

use arbiter_common::types::{Language, RunRequest, RunResponse};
use std::io;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{LanguageConfigManager, Toolchain};
use crate::metrics;
use crate::runner::{self, Limits, RunError};
use crate::staging::{StagingArea, Workspace};

/// Safety limits to keep pathological requests away from the toolchains
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Code not found")]
    MissingCode,
    #[error("{0}")]
    TooLarge(String),
    #[error("internal execution error: {0}")]
    Internal(#[from] io::Error),
}

pub struct ExecutionService {
    staging: StagingArea,
    languages: LanguageConfigManager,
    limits: Limits,
    permits: Semaphore,
}

impl ExecutionService {
    pub fn new(
        staging: StagingArea,
        languages: LanguageConfigManager,
        limits: Limits,
        max_concurrent_runs: usize,
    ) -> Self {
        Self {
            staging,
            languages,
            limits,
            permits: Semaphore::new(max_concurrent_runs.max(1)),
        }
    }

    #[instrument(skip(self, request), fields(language = %request.language))]
    pub async fn run(&self, request: RunRequest) -> Result<RunResponse, ServiceError> {
        let code = match request.code {
            Some(code) if !code.is_empty() => code,
            _ => return Err(ServiceError::MissingCode),
        };
        if code.len() > MAX_SOURCE_CODE_BYTES {
            return Err(ServiceError::TooLarge(format!(
                "Source code exceeds maximum size of {} bytes",
                MAX_SOURCE_CODE_BYTES
            )));
        }
        if request.input.len() > MAX_INPUT_BYTES {
            return Err(ServiceError::TooLarge(format!(
                "Input exceeds maximum size of {} bytes",
                MAX_INPUT_BYTES
            )));
        }

        let language = match Language::from_str(&request.language) {
            Some(language) => language,
            None => {
                info!(language = %request.language, "Unsupported language");
                metrics::RUNS_TOTAL
                    .with_label_values(&["unsupported", "unsupported_language"])
                    .inc();
                return Ok(RunResponse::unsupported_language(&request.language));
            }
        };
        let toolchain = self.languages.toolchain(language);

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let started = Instant::now();
        let mut workspace = self.staging.allocate().await?;
        let job_id = workspace.id();
        debug!(
            job_id = %job_id,
            source_size = code.len(),
            input_size = request.input.len(),
            "Job staged"
        );

        let result = self
            .stage_and_execute(&mut workspace, toolchain, &code, &request.input)
            .await;

        // Release before answering, whatever the outcome
        if let Err(e) = workspace.release().await {
            metrics::RELEASE_FAILURES_TOTAL.inc();
            error!(job_id = %job_id, error = %e, "Failed to release workspace");
        }

        let elapsed = started.elapsed();
        metrics::RUN_DURATION_SECONDS
            .with_label_values(&[language.as_str()])
            .observe(elapsed.as_secs_f64());

        match result {
            Ok(stdout) => {
                metrics::RUNS_TOTAL
                    .with_label_values(&[language.as_str(), "success"])
                    .inc();
                info!(
                    job_id = %job_id,
                    execution_ms = elapsed.as_millis() as u64,
                    "Execution succeeded"
                );
                Ok(RunResponse::ok(stdout))
            }
            Err(RunError::Internal(e)) => {
                metrics::RUNS_TOTAL
                    .with_label_values(&[language.as_str(), "internal_error"])
                    .inc();
                error!(job_id = %job_id, error = %e, "Execution infrastructure failure");
                Err(ServiceError::Internal(e))
            }
            Err(e) => {
                metrics::RUNS_TOTAL
                    .with_label_values(&[language.as_str(), e.label()])
                    .inc();
                warn!(
                    job_id = %job_id,
                    outcome = e.label(),
                    execution_ms = elapsed.as_millis() as u64,
                    "Execution failed"
                );
                Ok(RunResponse::failed(e.to_string(), e.kind()))
            }
        }
    }

    async fn stage_and_execute(
        &self,
        workspace: &mut Workspace,
        toolchain: &Toolchain,
        code: &str,
        input: &str,
    ) -> Result<String, RunError> {
        workspace.stage_source(&toolchain.source_file, code).await?;
        workspace.stage_input(input).await?;
        runner::execute(toolchain, workspace, &self.limits).await
    }
}
