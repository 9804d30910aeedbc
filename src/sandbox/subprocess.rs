//! Sandbox back-end that runs synthesized scripts in a child process.
//!
//! The program is written to a temp directory and handed to an interpreter
//! with a cleared environment. The child's stdout must be one JSON document:
//! the return value of the program's `main` entry point. Time bounding is the
//! executor's job; dropping the run future kills the child.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::SandboxError;

use super::{ProgramDialect, Sandbox};

/// Exit code a harness uses to report that the entry point is absent.
pub const ENTRY_MISSING_EXIT_CODE: i32 = 3;

const PROGRAM_PLACEHOLDER: &str = "{program}";
const URL_PLACEHOLDER: &str = "{url}";

/// Python harness: loads the program, calls `main(url)`, prints its JSON.
const PYTHON_HARNESS: &str = r#"import json, runpy, sys
ns = runpy.run_path(sys.argv[1])
entry = ns.get("main")
if not callable(entry):
    sys.stderr.write("entry point 'main' not found")
    sys.exit(3)
print(json.dumps(entry(sys.argv[2]), ensure_ascii=False, default=str))
"#;

/// Runs programs through an external interpreter.
#[derive(Debug, Clone)]
pub struct SubprocessSandbox {
    language: String,
    extension: String,
    command: String,
    args: Vec<String>,
}

impl SubprocessSandbox {
    /// Creates a sandbox for `language` programs.
    ///
    /// `args` may contain `{program}` (path of the written program file) and
    /// `{url}` (target URL) placeholders.
    pub fn new(
        language: impl Into<String>,
        extension: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            language: language.into(),
            extension: extension.into(),
            command: command.into(),
            args,
        }
    }

    /// `python3` with a harness that invokes `main(url)`.
    pub fn python3() -> Self {
        Self::new(
            "python",
            "py",
            "python3",
            vec![
                "-c".to_string(),
                PYTHON_HARNESS.to_string(),
                PROGRAM_PLACEHOLDER.to_string(),
                URL_PLACEHOLDER.to_string(),
            ],
        )
    }

    fn render_args(&self, program_path: &str, url: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace(PROGRAM_PLACEHOLDER, program_path)
                    .replace(URL_PLACEHOLDER, url)
            })
            .collect()
    }
}

/// Reads the entry point's return value from captured stdout.
///
/// Accepts either a single JSON document or JSON on the last non-empty line,
/// so stray prints before the result do not sink the run.
pub fn parse_program_output(stdout: &str) -> Result<Value, SandboxError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(SandboxError::Runtime("program produced no output".to_string()));
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    let last = trimmed.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
    serde_json::from_str(last.trim()).map_err(|e| {
        SandboxError::Runtime(format!("entry point output is not JSON: {}", e))
    })
}

#[async_trait]
impl Sandbox for SubprocessSandbox {
    fn dialect(&self) -> ProgramDialect {
        ProgramDialect::Script {
            language: self.language.clone(),
        }
    }

    async fn run(&self, program: &str, target_url: &str) -> Result<Value, SandboxError> {
        let workdir = tempfile::tempdir()?;
        let program_path = workdir.path().join(format!("extractor.{}", self.extension));
        tokio::fs::write(&program_path, program).await?;

        let args = self.render_args(&program_path.to_string_lossy(), target_url);

        let mut cmd = Command::new(&self.command);
        cmd.args(&args)
            .current_dir(workdir.path())
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }

        info!(command = %self.command, url = %target_url, "Starting sandboxed interpreter");

        let child = cmd.spawn().map_err(|e| SandboxError::Spawn {
            command: self.command.clone(),
            reason: e.to_string(),
        })?;
        let output = child.wait_with_output().await?;

        let code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(exit_code = code, stdout_len = stdout.len(), "Interpreter finished");

        if code == ENTRY_MISSING_EXIT_CODE {
            return Err(SandboxError::EntryPointMissing("main".to_string()));
        }
        if !output.status.success() {
            return Err(SandboxError::NonZeroExit {
                code,
                stderr: stderr.trim().chars().take(2000).collect(),
            });
        }

        parse_program_output(&stdout)
    }
}
