//! The fixed capability set handed to extraction programs.
//!
//! A running program sees nothing but this struct: bounded HTTP GET, markup
//! parsing and querying, JSON decoding, URL join/parse and regex compilation.

use std::sync::Arc;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use crate::error::SandboxError;
use crate::fetch::{parse_http_url, PageFetcher};

/// Whitelisted operations available inside the sandbox.
#[derive(Clone)]
pub struct Capabilities {
    fetcher: Arc<dyn PageFetcher>,
}

impl Capabilities {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Bounded HTTP GET; the fetcher enforces its own timeout.
    pub async fn http_get(&self, url: &str) -> Result<String, SandboxError> {
        Ok(self.fetcher.fetch(url).await?)
    }

    pub fn parse_markup(&self, html: &str) -> Html {
        Html::parse_document(html)
    }

    pub fn compile_selector(&self, selector: &str) -> Result<Selector, SandboxError> {
        Selector::parse(selector)
            .map_err(|e| SandboxError::Syntax(format!("invalid selector '{}': {}", selector, e)))
    }

    pub fn compile_regex(&self, pattern: &str) -> Result<Regex, SandboxError> {
        Regex::new(pattern)
            .map_err(|e| SandboxError::Syntax(format!("invalid pattern '{}': {}", pattern, e)))
    }

    pub fn decode_json(&self, text: &str) -> Option<Value> {
        serde_json::from_str(text.trim()).ok()
    }

    pub fn parse_url(&self, raw: &str) -> Result<Url, SandboxError> {
        parse_http_url(raw).map_err(|e| SandboxError::Capability {
            capability: "url_parse",
            reason: e.to_string(),
        })
    }

    /// Resolves `href` against `base`; returns `href` unchanged if it cannot.
    pub fn join_url(&self, base: &Url, href: &str) -> String {
        base.join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    }
}
