//! Aggregator: condenses successful extraction payloads into one summary.

use serde_json::json;
use tracing::{info, warn};

use crate::llm::TextGenerator;

use super::types::ExtractionResult;

const SUMMARY_SYSTEM_TEMPLATE: &str = r#"You are a professional content analyst. Using the data extracted from the web below, write a comprehensive summary report on the topic "{topic}".

Extracted data:
{data}

Cover:
1. The core points and key information about the topic
2. Important statistics or facts
3. The latest developments
4. Relevant background
5. Trends or impacts worth watching

Requirements:
- Accurate and objective
- Clear emphasis and structure
- Suitable as source material for a short video script
- Between 800 and 1200 words"#;

const SUMMARY_USER_TEMPLATE: &str = "Write the summary report for the topic '{topic}'";

/// Message used when no execution produced usable data.
pub fn no_data_message(topic: &str) -> String {
    format!(
        "No usable data was extracted for the topic '{}'. Check that the source pages are reachable or adjust the extraction strategy.",
        topic
    )
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    generator: TextGenerator,
}

impl Aggregator {
    pub fn new(generator: TextGenerator) -> Self {
        Self { generator }
    }

    /// Summarizes the usable payloads among `results`.
    ///
    /// Makes no backend call when nothing is usable. Backend failures become
    /// the summary text.
    pub async fn summarize(&self, topic: &str, results: &[ExtractionResult]) -> String {
        let successful: Vec<_> = results
            .iter()
            .filter_map(|r| {
                r.usable_payload()
                    .map(|payload| json!({ "url": r.source_url, "content": payload }))
            })
            .collect();

        if successful.is_empty() {
            info!(topic = %topic, "No successful extractions to summarize");
            return no_data_message(topic);
        }

        let data = serde_json::to_string_pretty(&successful).unwrap_or_default();
        let system = SUMMARY_SYSTEM_TEMPLATE
            .replace("{topic}", topic)
            .replace("{data}", &data);
        let user = SUMMARY_USER_TEMPLATE.replace("{topic}", topic);

        match self.generator.generate(&system, &user).await {
            Ok(summary) => {
                info!(topic = %topic, sources = successful.len(), "Generated summary report");
                summary
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Summary generation failed");
                format!("Summary generation failed: {}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
    use crate::sandbox::ExtractedRecord;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingProvider {
        fail: bool,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts
                .lock()
                .expect("lock")
                .push(request.system_prompt().unwrap_or_default().to_string());
            if self.fail {
                return Err(LlmError::ApiError {
                    code: 500,
                    message: "overloaded".to_string(),
                });
            }
            Ok(GenerationResponse {
                id: "r".to_string(),
                model: "m".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant("A summary."),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage::default(),
            })
        }
    }

    fn ok_result(url: &str, title: &str) -> ExtractionResult {
        ExtractionResult::succeeded(
            url,
            ExtractedRecord::from_value(json!({"title": title, "content": "body text"}), url),
        )
    }

    #[tokio::test]
    async fn test_no_successes_makes_no_call() {
        let provider = Arc::new(RecordingProvider::default());
        let aggregator = Aggregator::new(TextGenerator::new(provider.clone()));
        let results = vec![
            ExtractionResult::failed("https://a.test", "boom"),
            ExtractionResult::succeeded("https://b.test", ExtractedRecord::default()),
        ];

        let summary = aggregator.summarize("Chips", &results).await;
        assert_eq!(summary, no_data_message("Chips"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_only_usable_payloads_are_embedded() {
        let provider = Arc::new(RecordingProvider::default());
        let aggregator = Aggregator::new(TextGenerator::new(provider.clone()));
        let results = vec![
            ok_result("https://a.test", "First headline"),
            ExtractionResult::failed("https://b.test", "Timeout"),
        ];

        let summary = aggregator.summarize("Chips", &results).await;
        assert_eq!(summary, "A summary.");
        let prompt = provider.prompts.lock().expect("lock")[0].clone();
        assert!(prompt.contains("First headline"));
        assert!(prompt.contains("\"Chips\""));
        assert!(!prompt.contains("https://b.test"));
        assert!(prompt.contains("800 and 1200 words"));
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_text() {
        let provider = Arc::new(RecordingProvider {
            fail: true,
            ..Default::default()
        });
        let aggregator = Aggregator::new(TextGenerator::new(provider));
        let summary = aggregator
            .summarize("Chips", &[ok_result("https://a.test", "t")])
            .await;
        assert!(summary.starts_with("Summary generation failed:"));
        assert!(summary.contains("overloaded"));
    }
}
