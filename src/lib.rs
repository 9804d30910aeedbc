//! trendforge: turns a trending topic into short-form content.
//!
//! Given a topic and a few news URLs, the pipeline fingerprints each page,
//! synthesizes an extraction program for it, runs the programs in a sandbox,
//! summarizes what they extracted and writes a video script plus social
//! media copy from the summary.

// Core modules
pub mod cli;
pub mod error;
pub mod fetch;
pub mod llm;
pub mod pipeline;
pub mod sandbox;
pub mod trends;

// Re-export commonly used types
pub use error::{ConfigError, FetchError, LlmError, PipelineError, SandboxError};
pub use pipeline::{ContentBundle, PipelineConfig, PipelineOrchestrator, PipelineRun};
