//! Extractor synthesizer: asks the generation backend for an extraction
//! program tailored to a page fingerprint.

use tracing::{debug, info, warn};

use crate::llm::TextGenerator;
use crate::sandbox::ProgramDialect;

use super::types::{ExtractionProgram, StructuralFingerprint};

/// System prompt for program synthesis.
const SYNTHESIS_SYSTEM_TEMPLATE: &str = r#"You are an expert at writing web data extraction programs. Based on the page structure analysis below, write an efficient {dialect} for this page.

Requirements:
1. The program must be complete and runnable as-is
2. Extract the page's main content, title, text, image URLs and similar data
3. Produce structured data with the fields: url, title, content, publish_date, author, summary, keywords
4. Prefer the recommended strategy and the listed selectors
5. Expose a single entry point named `main` that receives the page URL

{requirements}

Page structure analysis:
{analysis}

Wrap the program in one fenced code block tagged `{fence}`."#;

const SYNTHESIS_USER_TEMPLATE: &str = "Write the extraction program for {url}";

/// Turns fingerprints into [`ExtractionProgram`]s. One backend call per
/// non-degraded fingerprint; never fails.
#[derive(Debug, Clone)]
pub struct ExtractorSynthesizer {
    generator: TextGenerator,
    dialect: ProgramDialect,
    synthesize_degraded: bool,
}

impl ExtractorSynthesizer {
    pub fn new(generator: TextGenerator, dialect: ProgramDialect) -> Self {
        Self {
            generator,
            dialect,
            synthesize_degraded: false,
        }
    }

    /// Also synthesize against fallback fingerprints of failed probes.
    pub fn with_synthesize_degraded(mut self, enabled: bool) -> Self {
        self.synthesize_degraded = enabled;
        self
    }

    pub fn dialect(&self) -> &ProgramDialect {
        &self.dialect
    }

    pub async fn synthesize(&self, fingerprint: &StructuralFingerprint) -> ExtractionProgram {
        let url = fingerprint.source_url.as_str();

        if fingerprint.is_degraded() && !self.synthesize_degraded {
            let reason = fingerprint
                .meta_info
                .error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            info!(url = %url, "Skipping synthesis for failed structure analysis");
            return ExtractionProgram::failed(url, reason);
        }

        let analysis = fingerprint.describe();
        let system = self.build_prompt(&analysis);
        let user = SYNTHESIS_USER_TEMPLATE.replace("{url}", url);
        debug!(url = %url, prompt_chars = system.len(), "Synthesizing extraction program");

        match self.generator.generate(&system, &user).await {
            Ok(response) => {
                let program = extract_program(&response, self.dialect.fence_tag());
                if program.is_empty() {
                    warn!(url = %url, "Backend returned an empty program");
                    return ExtractionProgram::failed(url, "Generated program is empty");
                }
                info!(url = %url, chars = program.len(), "Generated extraction program");
                ExtractionProgram::synthesized(url, program, analysis)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Program synthesis failed");
                ExtractionProgram::failed(url, e.to_string())
            }
        }
    }

    fn build_prompt(&self, analysis: &str) -> String {
        SYNTHESIS_SYSTEM_TEMPLATE
            .replace("{dialect}", &self.dialect.display_name())
            .replace("{requirements}", self.dialect.requirements())
            .replace("{fence}", self.dialect.fence_tag())
            .replace("{analysis}", analysis)
    }
}

/// Pulls the program body out of a backend response.
///
/// Prefers the first block fenced with `tag`, then the first fenced block of
/// any kind, then the whole response.
pub fn extract_program(response: &str, tag: &str) -> String {
    let tagged = format!("```{}", tag);
    if let Some(body) = fenced_after(response, &tagged) {
        return body;
    }
    if let Some(body) = fenced_after(response, "```") {
        return body;
    }
    response.trim().to_string()
}

fn fenced_after(response: &str, opener: &str) -> Option<String> {
    let start = response.find(opener)?;
    let rest = &response[start + opener.len()..];
    let end = rest.find("```")?;
    let inner = &rest[..end];
    let body = match inner.find('\n') {
        // The opener line may still carry an info string.
        Some(newline) => &inner[newline + 1..],
        None => without_info_string(inner),
    };
    Some(body.trim().to_string())
}

/// Drops a language tag glued to the opener of a single-line fence.
fn without_info_string(line: &str) -> &str {
    match line.split_once(char::is_whitespace) {
        Some((info, body))
            if !info.is_empty()
                && info.chars().all(|c| c.is_ascii_alphanumeric() || "+-_".contains(c)) =>
        {
            body
        }
        _ => line,
    }
}
