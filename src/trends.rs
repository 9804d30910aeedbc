//! Trend records handed over by the trend collaborator.
//!
//! Only the shape is modelled here; fetching and parsing trend feeds is not.

use serde::{Deserialize, Serialize};

/// A news item related to a trending topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub source: String,
}

/// One trending topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendTopic {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pub_date: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default, alias = "news_items")]
    pub related: Vec<RelatedItem>,
}

impl TrendTopic {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_related(mut self, item: RelatedItem) -> Self {
        self.related.push(item);
        self
    }

    /// First `cap` non-empty related URLs, in list order.
    pub fn seed_urls(&self, cap: usize) -> Vec<String> {
        self.related
            .iter()
            .map(|item| item.url.trim())
            .filter(|url| !url.is_empty())
            .take(cap)
            .map(str::to_string)
            .collect()
    }
}
