//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use trendforge::error::{FetchError, LlmError};
use trendforge::fetch::PageFetcher;
use trendforge::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};

/// Extraction plan the mock backend hands out for every page.
pub const DEFAULT_PLAN: &str = r#"```json
{"entry": "main", "fields": {
  "title": {"selector": "h1", "fallback": {"selector": "title"}},
  "content": {"selector": "p", "join": "\n"},
  "keywords": {"meta": "keywords", "split": ","}
}}
```"#;

/// What a backend call is for, recognised from its system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Synthesis,
    Summary,
    Script,
    Social,
}

impl PromptKind {
    pub fn classify(system: &str) -> Option<PromptKind> {
        if system.contains("data extraction programs") {
            Some(PromptKind::Synthesis)
        } else if system.contains("content analyst") {
            Some(PromptKind::Summary)
        } else if system.contains("video scriptwriter") {
            Some(PromptKind::Script)
        } else if system.contains("social media content creator") {
            Some(PromptKind::Social)
        } else {
            None
        }
    }
}

/// Deterministic backend that answers by prompt kind and counts calls.
pub struct ScriptedLlm {
    replies: HashMap<PromptKind, String>,
    failing: HashSet<PromptKind>,
    calls: Mutex<HashMap<PromptKind, usize>>,
    total: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        let mut replies = HashMap::new();
        replies.insert(PromptKind::Synthesis, DEFAULT_PLAN.to_string());
        replies.insert(PromptKind::Summary, "Summary: chips are back.".to_string());
        replies.insert(PromptKind::Script, "[0-10s] Hook. [10-50s] Body. [50-60s] Follow us.".to_string());
        replies.insert(PromptKind::Social, "IG post #chips\nTweet #chips\nLinkedIn article".to_string());
        Self {
            replies,
            failing: HashSet::new(),
            calls: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
        }
    }

    pub fn with_reply(mut self, kind: PromptKind, reply: impl Into<String>) -> Self {
        self.replies.insert(kind, reply.into());
        self
    }

    pub fn failing(mut self, kind: PromptKind) -> Self {
        self.failing.insert(kind);
        self
    }

    pub fn calls(&self, kind: PromptKind) -> usize {
        self.calls
            .lock()
            .expect("lock")
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let kind = PromptKind::classify(request.system_prompt().unwrap_or_default())
            .ok_or_else(|| LlmError::ParseError("unrecognised prompt".to_string()))?;
        *self.calls.lock().expect("lock").entry(kind).or_insert(0) += 1;

        if self.failing.contains(&kind) {
            return Err(LlmError::ApiError {
                code: 503,
                message: format!("{:?} backend down", kind),
            });
        }

        let text = self.replies.get(&kind).cloned().unwrap_or_default();
        Ok(GenerationResponse {
            id: "scripted".to_string(),
            model: "scripted-model".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(text),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        })
    }
}

/// In-memory web; unknown URLs fail with a connection error.
#[derive(Default)]
pub struct MapFetcher {
    pages: HashMap<String, String>,
    fetches: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), html.into());
        self
    }

    /// URLs requested so far, in request order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetches.lock().expect("lock").clone()
    }
}

#[async_trait]
impl PageFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetches.lock().expect("lock").push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Connection {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })
    }
}

/// Fetcher that panics, standing in for a bug outside every stage guard.
pub struct PanickingFetcher;

#[async_trait]
impl PageFetcher for PanickingFetcher {
    async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
        panic!("fetcher invariant violated")
    }
}

/// A small news article page.
pub fn article(headline: &str) -> String {
    format!(
        r#"<html lang="en"><head><title>{0} | News</title>
        <meta name="keywords" content="ai, trends"></head>
        <body><article><h1>{0}</h1><p>First paragraph about {0}.</p><p>Second paragraph.</p></article></body></html>"#,
        headline
    )
}

pub fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("https://news.test/story-{i}")).collect()
}

/// A web where every URL from [`urls`] serves an article.
pub fn full_web(n: usize) -> MapFetcher {
    urls(n)
        .iter()
        .enumerate()
        .fold(MapFetcher::new(), |web, (i, url)| {
            web.with_page(url, article(&format!("Story {i}")))
        })
}

