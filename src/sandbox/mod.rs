//! Isolated execution of synthesized extraction programs.
//!
//! A [`Sandbox`] runs one program against one target URL and returns the
//! value produced by its `main` entry point. Two back-ends exist:
//!
//! - [`PlanSandbox`]: interprets declarative JSON extraction plans in-process.
//!   Programs only reach the outside world through [`Capabilities`].
//! - [`SubprocessSandbox`]: hands a script to an external interpreter with a
//!   cleared environment.
//!
//! [`SandboxedExecutor`] wraps either back-end with a wall-clock bound and
//! panic containment, turning every outcome into an `ExtractionResult`.

pub mod capabilities;
pub mod executor;
pub mod plan;
pub mod record;
pub mod subprocess;

pub use capabilities::Capabilities;
pub use executor::SandboxedExecutor;
pub use plan::{PlanSandbox, ENTRY_POINT};
pub use record::{ExtractedRecord, RecordMetadata};
pub use subprocess::SubprocessSandbox;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SandboxError;

/// Contract text shown to the backend when it writes scripts.
const SCRIPT_CONTRACT: &str = "Define a function named `main(url)` that fetches the page at `url` \
and returns a dictionary with the keys: url, title, content, publish_date, author, summary, \
keywords (list of strings) and metadata. Only the standard library is importable: HTTP GET, \
HTML parsing, json, url joining and regular expressions. Do not read or write files, do not \
spawn processes and do not read environment variables. Print nothing; the return value of \
`main` is the result.";

/// The language programs for a given sandbox are written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramDialect {
    /// Declarative JSON extraction plans.
    ExtractionPlan,
    /// A script for an external interpreter.
    Script { language: String },
}

impl ProgramDialect {
    /// Info string expected on the fenced block holding the program.
    pub fn fence_tag(&self) -> &str {
        match self {
            ProgramDialect::ExtractionPlan => "json",
            ProgramDialect::Script { language } => language,
        }
    }

    /// Instructions the synthesizer embeds in its prompt.
    pub fn requirements(&self) -> &'static str {
        match self {
            ProgramDialect::ExtractionPlan => plan::PLAN_REFERENCE,
            ProgramDialect::Script { .. } => SCRIPT_CONTRACT,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            ProgramDialect::ExtractionPlan => "extraction plan".to_string(),
            ProgramDialect::Script { language } => format!("{} script", language),
        }
    }
}

/// Runs a single program against a single target URL.
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn dialect(&self) -> ProgramDialect;

    /// Invokes the program's entry point with `target_url`.
    async fn run(&self, program: &str, target_url: &str) -> Result<Value, SandboxError>;
}
