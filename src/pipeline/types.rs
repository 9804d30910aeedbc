//! Core data model of a pipeline run.
//!
//! Every per-URL list in [`RunState`] is index-aligned with the seed URLs:
//! position `i` of the fingerprints, programs and results always describes
//! `seed_urls[i]`. Failed steps produce degraded records instead of holes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::config::MAX_SEED_URLS;
use crate::sandbox::ExtractedRecord;

/// Extraction approach recommended by the structure prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionStrategy {
    /// The page embeds `application/ld+json` blocks.
    JsonLd,
    /// A main-content container was found.
    ContentSelector,
    /// Only generic text elements were found.
    TextExtraction,
    /// Nothing recognisable; scrape whatever is there.
    GeneralScraping,
}

impl ExtractionStrategy {
    /// Wire name of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStrategy::JsonLd => "json-ld",
            ExtractionStrategy::ContentSelector => "content-selector",
            ExtractionStrategy::TextExtraction => "text-extraction",
            ExtractionStrategy::GeneralScraping => "general-scraping",
        }
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page-level facts gathered while probing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInfo {
    /// Host part of the probed URL.
    pub domain: Option<String>,
    /// `<script type="application/ld+json">` present.
    pub has_json_ld: bool,
    /// `<meta name="description">` present.
    pub has_meta_description: bool,
    /// `[itemscope]` or `[vocab]` present.
    pub has_microdata: bool,
    /// Value of `<html lang>`, if any.
    pub page_lang: Option<String>,
    /// Number of elements in the parsed document.
    pub element_count: usize,
    /// Probe failure text; set only on degraded fingerprints.
    pub error: Option<String>,
}

/// Structural description of one page, used to steer program synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralFingerprint {
    pub source_url: String,
    pub page_title: String,
    pub main_content_selectors: Vec<String>,
    pub text_selectors: Vec<String>,
    pub image_selectors: Vec<String>,
    pub link_selectors: Vec<String>,
    pub meta_info: MetaInfo,
    pub recommended_strategy: ExtractionStrategy,
}

impl StructuralFingerprint {
    /// Fallback fingerprint produced when fetching or parsing fails.
    pub fn degraded(source_url: impl Into<String>, domain: Option<String>, error: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            page_title: "Analysis failed".to_string(),
            main_content_selectors: Vec::new(),
            text_selectors: ["p", "h1", "h2", "h3"].iter().map(|s| s.to_string()).collect(),
            image_selectors: vec!["img".to_string()],
            link_selectors: vec!["a".to_string()],
            meta_info: MetaInfo {
                domain,
                error: Some(error.into()),
                ..MetaInfo::default()
            },
            recommended_strategy: ExtractionStrategy::GeneralScraping,
        }
    }

    /// True when this fingerprint stands in for a failed probe.
    pub fn is_degraded(&self) -> bool {
        self.meta_info.error.is_some()
    }

    /// Plain-text rendering embedded in the synthesis prompt.
    pub fn describe(&self) -> String {
        let meta = serde_json::to_string(&self.meta_info).unwrap_or_default();
        format!(
            "URL: {url}\nTitle: {title}\nRecommended strategy: {strategy}\n\
             Main content selectors: {main:?}\nText selectors: {text:?}\n\
             Image selectors: {images:?}\nLink selectors: {links:?}\nMeta info: {meta}",
            url = self.source_url,
            title = self.page_title,
            strategy = self.recommended_strategy,
            main = self.main_content_selectors,
            text = self.text_selectors,
            images = self.image_selectors,
            links = self.link_selectors,
            meta = meta,
        )
    }
}

/// Synthesized extraction logic for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionProgram {
    pub source_url: String,
    pub program_text: Option<String>,
    pub synthesis_succeeded: bool,
    pub error: Option<String>,
    /// Fingerprint description the program was synthesized from.
    pub structural_info_used: Option<String>,
}

impl ExtractionProgram {
    pub fn synthesized(
        source_url: impl Into<String>,
        program_text: impl Into<String>,
        structural_info: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            program_text: Some(program_text.into()),
            synthesis_succeeded: true,
            error: None,
            structural_info_used: Some(structural_info.into()),
        }
    }

    pub fn failed(source_url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            program_text: None,
            synthesis_succeeded: false,
            error: Some(error.into()),
            structural_info_used: None,
        }
    }

    /// Program body, if synthesis succeeded and produced one.
    pub fn runnable_text(&self) -> Option<&str> {
        if !self.synthesis_succeeded {
            return None;
        }
        self.program_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

/// Outcome of executing one extraction program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub source_url: String,
    pub payload: Option<ExtractedRecord>,
    pub execution_succeeded: bool,
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn succeeded(source_url: impl Into<String>, payload: ExtractedRecord) -> Self {
        Self {
            source_url: source_url.into(),
            payload: Some(payload),
            execution_succeeded: true,
            error: None,
        }
    }

    pub fn failed(source_url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            payload: None,
            execution_succeeded: false,
            error: Some(error.into()),
        }
    }

    /// Successful execution that produced a non-empty payload.
    pub fn usable_payload(&self) -> Option<&ExtractedRecord> {
        if !self.execution_succeeded {
            return None;
        }
        self.payload.as_ref().filter(|p| !p.is_empty())
    }
}

/// States of the pipeline state machine, in visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    AnalyzingStructure,
    SynthesizingPrograms,
    Executing,
    Summarizing,
    WritingScript,
    WritingSocial,
    Done,
}

impl PipelineStage {
    /// Returns all stages in order, terminal state last.
    pub fn all_stages() -> Vec<PipelineStage> {
        vec![
            PipelineStage::AnalyzingStructure,
            PipelineStage::SynthesizingPrograms,
            PipelineStage::Executing,
            PipelineStage::Summarizing,
            PipelineStage::WritingScript,
            PipelineStage::WritingSocial,
            PipelineStage::Done,
        ]
    }

    /// The unconditional successor of this stage; `Done` is terminal.
    pub fn next(self) -> Option<PipelineStage> {
        match self {
            PipelineStage::AnalyzingStructure => Some(PipelineStage::SynthesizingPrograms),
            PipelineStage::SynthesizingPrograms => Some(PipelineStage::Executing),
            PipelineStage::Executing => Some(PipelineStage::Summarizing),
            PipelineStage::Summarizing => Some(PipelineStage::WritingScript),
            PipelineStage::WritingScript => Some(PipelineStage::WritingSocial),
            PipelineStage::WritingSocial => Some(PipelineStage::Done),
            PipelineStage::Done => None,
        }
    }

    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            PipelineStage::AnalyzingStructure => "Analyzing Structure",
            PipelineStage::SynthesizingPrograms => "Synthesizing Programs",
            PipelineStage::Executing => "Executing Programs",
            PipelineStage::Summarizing => "Summarizing",
            PipelineStage::WritingScript => "Writing Script",
            PipelineStage::WritingSocial => "Writing Social Copy",
            PipelineStage::Done => "Done",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Working memory of one run. Owned by a single orchestrator invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub topic: String,
    pub seed_urls: Vec<String>,
    pub fingerprints: Vec<StructuralFingerprint>,
    pub programs: Vec<ExtractionProgram>,
    pub results: Vec<ExtractionResult>,
    pub summary: String,
    pub video_script: String,
    pub social_copy: String,
    pub diagnostics: Vec<String>,
    /// Stages in the order they were entered.
    pub visited: Vec<PipelineStage>,
}

impl RunState {
    /// Creates the state for a run, admitting at most `cap` seed URLs and
    /// never more than [`MAX_SEED_URLS`].
    pub fn new(topic: impl Into<String>, seed_urls: &[String], cap: usize) -> Self {
        let cap = cap.min(MAX_SEED_URLS);
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            topic: topic.into(),
            seed_urls: seed_urls.iter().take(cap).cloned().collect(),
            fingerprints: Vec::new(),
            programs: Vec::new(),
            results: Vec::new(),
            summary: String::new(),
            video_script: String::new(),
            social_copy: String::new(),
            diagnostics: Vec::new(),
            visited: Vec::new(),
        }
    }

    /// Checks that a per-URL list produced by `stage` matches the seed list.
    pub fn check_alignment(&self, stage: PipelineStage, produced: &[String]) -> Result<(), PipelineError> {
        let aligned = produced.len() == self.seed_urls.len()
            && produced.iter().zip(&self.seed_urls).all(|(a, b)| a == b);
        if aligned {
            Ok(())
        } else {
            Err(PipelineError::Misaligned {
                stage: stage.display_name().to_string(),
                expected: self.seed_urls.len(),
                actual: produced.len(),
            })
        }
    }

    /// Number of executions that succeeded.
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.execution_succeeded).count()
    }

    /// Builds the caller-facing bundle from the final state.
    pub fn to_bundle(&self) -> ContentBundle {
        ContentBundle {
            video_script: self.video_script.clone(),
            social_copy: self.social_copy.clone(),
            summary: self.summary.clone(),
            success_count: self.success_count(),
            processed_urls: self
                .fingerprints
                .iter()
                .map(|f| f.source_url.clone())
                .collect(),
        }
    }
}

/// Final artifact handed to the presentation/export collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBundle {
    pub video_script: String,
    pub social_copy: String,
    pub summary: String,
    pub success_count: usize,
    pub processed_urls: Vec<String>,
}

impl ContentBundle {
    /// Bundle returned when a fault escapes every stage guard.
    pub fn defensive_failure(reason: &str) -> Self {
        Self {
            video_script: format!("Workflow execution failed: {}", reason),
            social_copy: format!("Workflow execution failed: {}", reason),
            summary: format!("Workflow execution failed: {}", reason),
            success_count: 0,
            processed_urls: Vec::new(),
        }
    }
}
