//! Generation backend integration for trendforge.
//!
//! The pipeline treats text generation as one opaque operation,
//! `generate(system, user) -> text`, exposed by [`TextGenerator`]. Underneath
//! sits the [`LlmProvider`] trait, implemented by [`LiteLlmClient`] for any
//! OpenAI-compatible `/chat/completions` endpoint and by test doubles.
//!
//! ```ignore
//! use std::sync::Arc;
//! use trendforge::llm::{LiteLlmClient, TextGenerator};
//!
//! let client = LiteLlmClient::from_env()?;
//! let generator = TextGenerator::new(Arc::new(client)).with_temperature(0.7);
//! let text = generator.generate("You are concise.", "Say hi").await?;
//! ```

pub mod generator;
pub mod litellm;

pub use generator::TextGenerator;
pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
    DEFAULT_API_BASE, DEFAULT_LLM_TIMEOUT, DEFAULT_MODEL,
};
