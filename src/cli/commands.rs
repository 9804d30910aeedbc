//! CLI command definitions for trendforge.
//!
//! The binary is a thin driver around [`PipelineOrchestrator`]: it builds the
//! pipeline from the environment, streams progress to stderr and prints the
//! final bundle as JSON on stdout.

use std::fs;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;

use crate::fetch::HttpFetcher;
use crate::llm::{LiteLlmClient, TextGenerator};
use crate::pipeline::{PipelineConfig, PipelineOrchestrator};
use crate::sandbox::{PlanSandbox, Sandbox, SubprocessSandbox};
use crate::trends::TrendTopic;

/// Trend-to-content pipeline: scrape, summarize and write short-form content.
#[derive(Parser)]
#[command(name = "trendforge")]
#[command(about = "Turn a trending topic and its news links into a summary, a video script and social posts")]
#[command(version)]
#[command(
    long_about = "trendforge probes each news page, synthesizes an extraction program for it, runs the programs in a sandbox and writes content from the results.\n\nExample usage:\n  trendforge run --topic \"AI Trends\" --url https://example.com/a --url https://example.com/b"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full pipeline for one topic.
    Run(RunArgs),
}

/// Which sandbox back-end executes synthesized programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SandboxKind {
    /// Declarative extraction plans interpreted in-process.
    Plan,
    /// Python scripts run by a `python3` subprocess.
    Python,
}

/// Arguments for `trendforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Topic title.
    #[arg(short, long, required_unless_present = "topic_file")]
    pub topic: Option<String>,

    /// Seed URL; repeat for several. Only the first few are used.
    #[arg(short, long = "url")]
    pub urls: Vec<String>,

    /// JSON file holding a trend record; its title and related URLs seed the run.
    #[arg(long, conflicts_with_all = ["topic", "urls"])]
    pub topic_file: Option<String>,

    /// Synthesize programs even for pages whose structure probe failed.
    #[arg(long)]
    pub synthesize_degraded: bool,

    /// Sandbox back-end for synthesized programs.
    #[arg(long, value_enum, default_value = "plan")]
    pub sandbox: SandboxKind,

    /// Model override for every generation call.
    #[arg(short, long)]
    pub model: Option<String>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline_command(args).await,
    }
}

async fn run_pipeline_command(args: RunArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if args.synthesize_degraded {
        config = config.with_synthesize_degraded(true);
    }

    let (topic, urls) = resolve_inputs(&args, config.max_seed_urls)?;
    if urls.is_empty() {
        anyhow::bail!("No seed URLs given. Pass --url or a --topic-file with related items.");
    }

    let client = LiteLlmClient::from_env()?;
    info!(api_base = %client.api_base(), model = %client.default_model(), "Using generation backend");
    let mut generator = TextGenerator::new(Arc::new(client));
    if let Some(model) = &args.model {
        generator = generator.with_model(model.clone());
    }

    let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout, &config.user_agent)?);
    let sandbox: Arc<dyn Sandbox> = match args.sandbox {
        SandboxKind::Plan => Arc::new(PlanSandbox::new(fetcher.clone())),
        SandboxKind::Python => Arc::new(SubprocessSandbox::python3()),
    };

    let orchestrator = PipelineOrchestrator::from_config(config, generator, fetcher, sandbox)?;
    info!(
        urls = urls.len(),
        max_seed_urls = orchestrator.config().max_seed_urls,
        concurrency = orchestrator.config().fanout_concurrency,
        "Starting pipeline"
    );

    let progress = |message: &str| eprintln!("{}", message);
    let bundle = orchestrator.run(&topic, &urls, Some(&progress)).await;

    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}

fn resolve_inputs(args: &RunArgs, cap: usize) -> anyhow::Result<(String, Vec<String>)> {
    if let Some(path) = &args.topic_file {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
        let trend: TrendTopic =
            serde_json::from_str(&raw).with_context(|| format!("parsing trend record {}", path))?;
        let urls = trend.seed_urls(cap);
        return Ok((trend.title, urls));
    }

    let topic = args.topic.clone().unwrap_or_default();
    Ok((topic, args.urls.clone()))
}
