//! Error types for trendforge operations.
//!
//! Defines the error types for the subsystems the pipeline drives:
//! - Generation backend (LLM) calls
//! - Page fetches
//! - Sandboxed execution of synthesized extraction programs
//! - Configuration loading and validation
//! - Systemic pipeline faults
//!
//! Per-item errors never leave their stage as `Err`; stages convert them into
//! failure flags plus message text on the records they produce.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: OPENAI_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("LLM response contained no content")]
    EmptyResponse,
}

/// Errors that can occur while fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request to {url} timed out after {seconds} seconds")]
    Timeout { url: String, seconds: u64 },

    #[error("Connection to {url} failed: {reason}")]
    Connection { url: String, reason: String },

    #[error("HTTP error {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to read body of {url}: {reason}")]
    Body { url: String, reason: String },
}

/// Errors that can occur while running a synthesized extraction program.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Program is malformed: {0}")]
    Syntax(String),

    #[error("Entry point '{0}' not found in program")]
    EntryPointMissing(String),

    #[error("Capability '{capability}' failed: {reason}")]
    Capability {
        capability: &'static str,
        reason: String,
    },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Execution timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Execution panicked: {0}")]
    Panicked(String),

    #[error("Failed to spawn interpreter '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("Interpreter exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FetchError> for SandboxError {
    fn from(err: FetchError) -> Self {
        SandboxError::Capability {
            capability: "http_fetch",
            reason: err.to_string(),
        }
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Faults that escape every per-stage guard of a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage '{stage}' produced {actual} records for {expected} seed URLs")]
    Misaligned {
        stage: String,
        expected: usize,
        actual: usize,
    },

    #[error("Pipeline panicked: {0}")]
    Panicked(String),
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_converts_to_capability_fault() {
        let err: SandboxError = FetchError::Status {
            url: "https://example.com".to_string(),
            status: 503,
        }
        .into();

        match err {
            SandboxError::Capability { capability, reason } => {
                assert_eq!(capability, "http_fetch");
                assert!(reason.contains("503"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_timeout_message_uses_seconds() {
        let err = SandboxError::Timeout(Duration::from_secs(45));
        assert_eq!(err.to_string(), "Execution timed out after 45 seconds");
    }

    #[test]
    fn test_panic_message_extracts_text() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
