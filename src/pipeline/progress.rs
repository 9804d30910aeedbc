//! Progress reporting for pipeline runs.
//!
//! The orchestrator emits [`PipelineEvent`]s; each one is logged and its
//! human-readable rendering is handed to an optional [`ProgressSink`].
//! Sinks are observational only: they cannot fail the run and a panicking
//! sink is contained.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::types::PipelineStage;

/// Milestones of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineEvent {
    StageStarted { stage: PipelineStage, items: usize },
    ItemSucceeded { stage: PipelineStage, url: String },
    ItemFailed { stage: PipelineStage, url: String, error: String },
    RunCompleted { success_count: usize, processed: usize },
    RunFailed { reason: String },
}

impl std::fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineEvent::StageStarted { stage, items } if *items > 0 => {
                write!(f, "{} ({} URLs)...", stage, items)
            }
            PipelineEvent::StageStarted { stage, .. } => write!(f, "{}...", stage),
            PipelineEvent::ItemSucceeded { stage, url } => write!(f, "{}: done {}", stage, url),
            PipelineEvent::ItemFailed { stage, url, error } => {
                write!(f, "{}: failed {} ({})", stage, url, error)
            }
            PipelineEvent::RunCompleted {
                success_count,
                processed,
            } => write!(
                f,
                "Done: {}/{} URLs extracted successfully",
                success_count, processed
            ),
            PipelineEvent::RunFailed { reason } => write!(f, "Workflow execution failed: {}", reason),
        }
    }
}

/// Receives human-readable progress messages.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_progress(&self, message: &str) {
        self(message)
    }
}

/// Forwards messages into a bounded channel, dropping them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that drains it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, message: &str) {
        let _ = self.tx.try_send(message.to_string());
    }
}

/// Writes messages to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_progress(&self, message: &str) {
        tracing::info!(target: "trendforge::progress", "{}", message);
    }
}

/// Logs `event` and forwards it to `sink`, containing any sink panic.
pub fn notify(sink: Option<&dyn ProgressSink>, event: &PipelineEvent) {
    match event {
        PipelineEvent::ItemFailed { .. } => tracing::warn!(event = ?event, "{}", event),
        PipelineEvent::RunFailed { .. } => tracing::error!(event = ?event, "{}", event),
        _ => tracing::info!(event = ?event, "{}", event),
    }

    if let Some(sink) = sink {
        let message = event.to_string();
        if catch_unwind(AssertUnwindSafe(|| sink.on_progress(&message))).is_err() {
            tracing::warn!("Progress sink panicked; message dropped");
        }
    }
}
