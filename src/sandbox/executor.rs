//! Time-bounded, panic-contained execution of extraction programs.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tracing::{info, warn};

use crate::error::{panic_message, SandboxError};
use crate::pipeline::types::{ExtractionProgram, ExtractionResult};

use super::record::ExtractedRecord;
use super::{ProgramDialect, Sandbox};

/// Default wall-clock bound on one program run.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(45);

/// Runs programs on a [`Sandbox`] and records every outcome as data.
#[derive(Clone)]
pub struct SandboxedExecutor {
    sandbox: Arc<dyn Sandbox>,
    timeout: Duration,
}

impl SandboxedExecutor {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            sandbox,
            timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn dialect(&self) -> ProgramDialect {
        self.sandbox.dialect()
    }

    /// Executes `program` against its own source URL.
    ///
    /// Never fails: missing programs, sandbox errors, timeouts and panics all
    /// produce a failed [`ExtractionResult`] for the same URL.
    pub async fn execute(&self, program: &ExtractionProgram) -> ExtractionResult {
        let url = program.source_url.clone();

        let Some(text) = program.runnable_text() else {
            let reason = program
                .error
                .clone()
                .unwrap_or_else(|| "No program to execute".to_string());
            info!(url = %url, "Skipping execution: {}", reason);
            return ExtractionResult::failed(url, reason);
        };

        match self.run_isolated(text.to_string(), url.clone()).await {
            Ok(value) => {
                let record = ExtractedRecord::from_value(value, &url);
                info!(
                    url = %url,
                    title = %record.title,
                    words = record.metadata.word_count,
                    "Program executed successfully"
                );
                ExtractionResult::succeeded(url, record)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Program execution failed");
                ExtractionResult::failed(url, e.to_string())
            }
        }
    }

    async fn run_isolated(
        &self,
        program: String,
        url: String,
    ) -> Result<serde_json::Value, SandboxError> {
        let sandbox = Arc::clone(&self.sandbox);
        let handle = tokio::spawn(async move { sandbox.run(&program, &url).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => Err(SandboxError::Panicked(join_failure(join_err))),
            Err(_) => {
                abort.abort();
                Err(SandboxError::Timeout(self.timeout))
            }
        }
    }
}

impl std::fmt::Debug for SandboxedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxedExecutor")
            .field("dialect", &self.sandbox.dialect())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn join_failure(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    panic_message(&*err.into_panic())
}
