//! The opaque `generate(system, user) -> text` operation the pipeline uses.

use std::sync::Arc;

use crate::error::LlmError;

use super::litellm::{GenerationRequest, LlmProvider, Message};

/// Thin façade over an [`LlmProvider`] that turns a system/user prompt pair
/// into response text.
///
/// Cloning is cheap; all clones share the same provider.
#[derive(Clone)]
pub struct TextGenerator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl TextGenerator {
    /// Wraps a provider; an empty model name defers to the provider default.
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: String::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Pins a model for every request.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature for every request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Caps generated tokens for every request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Runs one backend call and returns the first choice's text.
    ///
    /// Blank responses are reported as [`LlmError::EmptyResponse`] so callers
    /// never mistake them for a generated artifact.
    pub async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let mut request = GenerationRequest::new(
            self.model.clone(),
            vec![Message::system(system), Message::user(user)],
        );
        if let Some(t) = self.temperature {
            request = request.with_temperature(t);
        }
        if let Some(m) = self.max_tokens {
            request = request.with_max_tokens(m);
        }

        tracing::debug!(
            system_chars = system.len(),
            user_chars = user.len(),
            "Calling generation backend"
        );

        let response = self.provider.generate(request).await?;
        match response.first_content() {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(LlmError::EmptyResponse),
        }
    }
}

impl std::fmt::Debug for TextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextGenerator")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Choice, GenerationResponse, Usage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingProvider {
        reply: String,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.seen.lock().expect("lock poisoned").push(request);
            Ok(GenerationResponse {
                id: "id".to_string(),
                model: "m".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(self.reply.clone()),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage::default(),
            })
        }
    }

    #[tokio::test]
    async fn test_generate_sends_system_and_user() {
        let provider = Arc::new(RecordingProvider {
            reply: "done".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let generator = TextGenerator::new(provider.clone())
            .with_model("m1")
            .with_temperature(0.2);

        let text = generator.generate("sys", "usr").await.expect("should generate");
        assert_eq!(text, "done");

        let seen = provider.seen.lock().expect("lock poisoned");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "m1");
        assert_eq!(seen[0].messages, vec![Message::system("sys"), Message::user("usr")]);
        assert_eq!(seen[0].temperature, Some(0.2));
    }

    #[tokio::test]
    async fn test_blank_reply_is_an_error() {
        let provider = Arc::new(RecordingProvider {
            reply: "   \n".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let err = TextGenerator::new(provider)
            .generate("sys", "usr")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }
}
