//! Content pipeline orchestration.
//!
//! Turns a trending topic plus a handful of seed URLs into a summary, a
//! short video script and social media copy.
//!
//! # Architecture
//!
//! - **Probe**: fetches each page and fingerprints its structure
//! - **Synthesizer**: asks the generation backend for an extraction program per page
//! - **Executor** (in [`crate::sandbox`]): runs each program in isolation
//! - **Aggregator**: summarizes the successful extractions
//! - **Writers**: derive the video script and social copy from the summary
//! - **Orchestrator**: the linear state machine tying the stages together
//!
//! # Pipeline Flow
//!
//! 1. **Analyzing Structure**: one fingerprint per seed URL, degraded on fetch failure
//! 2. **Synthesizing Programs**: one program per fingerprint
//! 3. **Executing Programs**: one result per program
//! 4. **Summarizing**: one summary for the run
//! 5. **Writing Script** and **Writing Social Copy**
//!
//! Per-URL lists stay index-aligned with the seed URLs throughout.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trendforge::fetch::HttpFetcher;
//! use trendforge::llm::{LiteLlmClient, TextGenerator};
//! use trendforge::pipeline::{PipelineConfig, PipelineOrchestrator, TracingSink};
//! use trendforge::sandbox::PlanSandbox;
//!
//! let config = PipelineConfig::from_env()?;
//! let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout, &config.user_agent)?);
//! let generator = TextGenerator::new(Arc::new(LiteLlmClient::from_env()?));
//! let sandbox = Arc::new(PlanSandbox::new(fetcher.clone()));
//!
//! let orchestrator = PipelineOrchestrator::from_config(config, generator, fetcher, sandbox)?;
//! let bundle = orchestrator
//!     .run("AI Trends", &["https://example.com/story".to_string()], Some(&TracingSink))
//!     .await;
//! println!("{}", bundle.video_script);
//! ```

pub mod aggregator;
pub mod config;
pub mod orchestrator;
pub mod probe;
pub mod progress;
pub mod synthesizer;
pub mod types;
pub mod writers;

pub use aggregator::Aggregator;
pub use config::PipelineConfig;
pub use orchestrator::{PipelineOrchestrator, PipelineRun};
pub use probe::StructureProber;
pub use progress::{ChannelSink, PipelineEvent, ProgressSink, TracingSink};
pub use synthesizer::ExtractorSynthesizer;
pub use types::{
    ContentBundle, ExtractionProgram, ExtractionResult, ExtractionStrategy, MetaInfo,
    PipelineStage, RunState, StructuralFingerprint,
};
pub use writers::{ScriptWriter, SocialWriter};
