//! Pipeline orchestrator: drives one run through every stage.
//!
//! The state machine is strictly linear. Each stage runs once per run no
//! matter how many items fail inside it; per-item faults are recorded in the
//! [`RunState`] and the machine advances unconditionally. Fan-out stages
//! process URLs concurrently, bounded by `fanout_concurrency`, and keep
//! results in seed order.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, Instrument};

use crate::error::{panic_message, ConfigError, PipelineError};
use crate::fetch::PageFetcher;
use crate::llm::TextGenerator;
use crate::sandbox::{Sandbox, SandboxedExecutor};

use super::aggregator::Aggregator;
use super::config::PipelineConfig;
use super::probe::StructureProber;
use super::progress::{notify, PipelineEvent, ProgressSink};
use super::synthesizer::ExtractorSynthesizer;
use super::types::{ContentBundle, PipelineStage, RunState};
use super::writers::{ScriptWriter, SocialWriter};

/// Everything a run produced: the caller-facing bundle and the full state.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub bundle: ContentBundle,
    pub state: RunState,
}

/// Coordinates the stages of a content run.
///
/// Holds no per-run state, so one orchestrator can serve concurrent runs.
#[derive(Debug, Clone)]
pub struct PipelineOrchestrator {
    prober: StructureProber,
    synthesizer: ExtractorSynthesizer,
    executor: SandboxedExecutor,
    aggregator: Aggregator,
    script_writer: ScriptWriter,
    social_writer: SocialWriter,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    /// Wires every stage from shared collaborators.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn from_config(
        config: PipelineConfig,
        generator: TextGenerator,
        fetcher: Arc<dyn PageFetcher>,
        sandbox: Arc<dyn Sandbox>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let executor = SandboxedExecutor::new(sandbox).with_timeout(config.execution_timeout);
        let synthesizer = ExtractorSynthesizer::new(generator.clone(), executor.dialect())
            .with_synthesize_degraded(config.synthesize_degraded);

        Ok(Self {
            prober: StructureProber::new(fetcher),
            synthesizer,
            executor,
            aggregator: Aggregator::new(generator.clone()),
            script_writer: ScriptWriter::new(generator.clone()),
            social_writer: SocialWriter::new(generator),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline and returns only the bundle.
    pub async fn run(
        &self,
        topic: &str,
        seed_urls: &[String],
        sink: Option<&dyn ProgressSink>,
    ) -> ContentBundle {
        self.execute(topic, seed_urls, sink).await.bundle
    }

    /// Runs the pipeline to completion. Never fails.
    ///
    /// A fault that escapes every stage guard (a panic or a broken
    /// invariant) yields [`ContentBundle::defensive_failure`].
    pub async fn execute(
        &self,
        topic: &str,
        seed_urls: &[String],
        sink: Option<&dyn ProgressSink>,
    ) -> PipelineRun {
        let mut state = RunState::new(topic, seed_urls, self.config.max_seed_urls);
        if seed_urls.len() > state.seed_urls.len() {
            debug!(
                given = seed_urls.len(),
                kept = state.seed_urls.len(),
                "Dropped seed URLs over the cap"
            );
        }

        let span = tracing::info_span!("pipeline_run", run_id = %state.run_id, topic = %state.topic);
        let outcome = AssertUnwindSafe(self.drive(&mut state, sink))
            .catch_unwind()
            .instrument(span)
            .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => Some(PipelineError::Panicked(panic_message(&*payload))),
        };

        let bundle = match failure {
            None => state.to_bundle(),
            Some(e) => {
                let reason = e.to_string();
                error!(run_id = %state.run_id, error = %reason, "Pipeline run failed");
                state.diagnostics.push(reason.clone());
                notify(sink, &PipelineEvent::RunFailed { reason: reason.clone() });
                ContentBundle::defensive_failure(&reason)
            }
        };

        PipelineRun { bundle, state }
    }

    async fn drive(
        &self,
        state: &mut RunState,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<(), PipelineError> {
        let mut current = Some(PipelineStage::AnalyzingStructure);
        while let Some(stage) = current {
            state.visited.push(stage);
            self.run_stage(stage, state, sink).await?;
            current = stage.next();
        }
        Ok(())
    }

    async fn run_stage(
        &self,
        stage: PipelineStage,
        state: &mut RunState,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<(), PipelineError> {
        if stage != PipelineStage::Done {
            let items = match stage {
                PipelineStage::AnalyzingStructure
                | PipelineStage::SynthesizingPrograms
                | PipelineStage::Executing => state.seed_urls.len(),
                _ => 0,
            };
            notify(sink, &PipelineEvent::StageStarted { stage, items });
        }

        match stage {
            PipelineStage::AnalyzingStructure => {
                let fingerprints = self
                    .bounded(state.seed_urls.iter().map(|url| self.prober.probe(url)))
                    .await;
                for fp in &fingerprints {
                    report(state, sink, stage, &fp.source_url, fp.meta_info.error.as_deref());
                }
                state.fingerprints = fingerprints;
                let urls: Vec<String> = state.fingerprints.iter().map(|f| f.source_url.clone()).collect();
                state.check_alignment(stage, &urls)?;
            }
            PipelineStage::SynthesizingPrograms => {
                let programs = self
                    .bounded(state.fingerprints.iter().map(|fp| self.synthesizer.synthesize(fp)))
                    .await;
                for program in &programs {
                    let error = (!program.synthesis_succeeded)
                        .then(|| program.error.as_deref().unwrap_or("synthesis failed"));
                    report(state, sink, stage, &program.source_url, error);
                }
                state.programs = programs;
                let urls: Vec<String> = state.programs.iter().map(|p| p.source_url.clone()).collect();
                state.check_alignment(stage, &urls)?;
            }
            PipelineStage::Executing => {
                let results = self
                    .bounded(state.programs.iter().map(|program| self.executor.execute(program)))
                    .await;
                for result in &results {
                    let error = (!result.execution_succeeded)
                        .then(|| result.error.as_deref().unwrap_or("execution failed"));
                    report(state, sink, stage, &result.source_url, error);
                }
                state.results = results;
                let urls: Vec<String> = state.results.iter().map(|r| r.source_url.clone()).collect();
                state.check_alignment(stage, &urls)?;
            }
            PipelineStage::Summarizing => {
                state.summary = self.aggregator.summarize(&state.topic, &state.results).await;
            }
            PipelineStage::WritingScript => {
                state.video_script = self.script_writer.write(&state.topic, &state.summary).await;
            }
            PipelineStage::WritingSocial => {
                state.social_copy = self
                    .social_writer
                    .write(&state.topic, &state.video_script, &state.summary)
                    .await;
            }
            PipelineStage::Done => {
                info!(
                    success_count = state.success_count(),
                    processed = state.seed_urls.len(),
                    "Pipeline run completed"
                );
                notify(
                    sink,
                    &PipelineEvent::RunCompleted {
                        success_count: state.success_count(),
                        processed: state.seed_urls.len(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Awaits every future with at most `fanout_concurrency` in flight,
    /// returning outputs in input order.
    async fn bounded<F>(&self, futures: impl IntoIterator<Item = F>) -> Vec<F::Output>
    where
        F: Future,
    {
        let permits = Semaphore::new(self.config.fanout_concurrency);
        let permits = &permits;
        join_all(futures.into_iter().map(|fut| async move {
            let _permit = permits.acquire().await.ok();
            fut.await
        }))
        .await
    }
}

/// Records one item's outcome as an event and, on failure, a diagnostic.
fn report(
    state: &mut RunState,
    sink: Option<&dyn ProgressSink>,
    stage: PipelineStage,
    url: &str,
    error: Option<&str>,
) {
    let event = match error {
        None => PipelineEvent::ItemSucceeded {
            stage,
            url: url.to_string(),
        },
        Some(error) => {
            state
                .diagnostics
                .push(format!("{}: {}: {}", stage, url, error));
            PipelineEvent::ItemFailed {
                stage,
                url: url.to_string(),
                error: error.to_string(),
            }
        }
    };
    notify(sink, &event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, LlmError, SandboxError};
    use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
    use crate::sandbox::ProgramDialect;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedLlm;

    #[async_trait]
    impl LlmProvider for FixedLlm {
        async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            Ok(GenerationResponse {
                id: "f".to_string(),
                model: "m".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant("```json\n{\"entry\":\"main\",\"fields\":{}}\n```"),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage::default(),
            })
        }
    }

    /// Serves every URL, tracking the highest number of concurrent fetches.
    #[derive(Default)]
    struct SlowFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            // Later URLs finish first.
            let delay = if url.ends_with('0') { 60 } else { 5 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("<html><title>{}</title><p>text</p></html>", url))
        }
    }

    struct EchoSandbox;

    #[async_trait]
    impl Sandbox for EchoSandbox {
        fn dialect(&self) -> ProgramDialect {
            ProgramDialect::ExtractionPlan
        }

        async fn run(&self, _program: &str, target_url: &str) -> Result<Value, SandboxError> {
            Ok(json!({"title": target_url, "content": "some words here"}))
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://site.test/{i}")).collect()
    }

    fn orchestrator(config: PipelineConfig, fetcher: Arc<SlowFetcher>) -> PipelineOrchestrator {
        PipelineOrchestrator::from_config(
            config,
            TextGenerator::new(Arc::new(FixedLlm)),
            fetcher,
            Arc::new(EchoSandbox),
        )
        .expect("valid config")
    }

    #[tokio::test]
    async fn test_fan_out_keeps_seed_order() {
        let fetcher = Arc::new(SlowFetcher::default());
        let orch = orchestrator(PipelineConfig::default(), fetcher.clone());

        let run = orch.execute("Order", &urls(3), None).await;
        let fp_urls: Vec<_> = run.state.fingerprints.iter().map(|f| f.source_url.clone()).collect();
        assert_eq!(fp_urls, urls(3));
        assert_eq!(run.bundle.processed_urls, urls(3));
        assert_eq!(run.bundle.success_count, 3);
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fanout_concurrency_is_bounded() {
        let fetcher = Arc::new(SlowFetcher::default());
        let orch = orchestrator(PipelineConfig::default().with_fanout_concurrency(1), fetcher.clone());

        assert_eq!(orch.config().fanout_concurrency, 1);
        let run = orch.execute("Serial", &urls(3), None).await;
        assert_eq!(run.state.fingerprints.len(), 3);
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_every_stage_is_visited_once() {
        let orch = orchestrator(PipelineConfig::default(), Arc::new(SlowFetcher::default()));
        let messages = Mutex::new(Vec::new());
        let sink = |m: &str| messages.lock().expect("lock").push(m.to_string());

        let run = orch.execute("Stages", &urls(1), Some(&sink)).await;
        assert_eq!(run.state.visited, PipelineStage::all_stages());

        let messages = messages.lock().expect("lock");
        for stage in PipelineStage::all_stages() {
            if stage != PipelineStage::Done {
                assert!(
                    messages.iter().any(|m| m.starts_with(stage.display_name())),
                    "no message for {stage}"
                );
            }
        }
        assert!(messages.last().expect("messages").starts_with("Done:"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = PipelineOrchestrator::from_config(
            PipelineConfig::default().with_max_seed_urls(0),
            TextGenerator::new(Arc::new(FixedLlm)),
            Arc::new(SlowFetcher::default()),
            Arc::new(EchoSandbox),
        );
        assert!(result.is_err());
    }
}
