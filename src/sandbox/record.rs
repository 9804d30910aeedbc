//! Normalized shape of data returned by extraction programs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Words per minute used for the reading-time estimate.
const READING_WORDS_PER_MINUTE: usize = 200;

/// Serialized names of the typed fields; `extra` must never reuse them.
const RECORD_FIELDS: &[&str] = &[
    "url",
    "title",
    "content",
    "publish_date",
    "author",
    "summary",
    "keywords",
    "metadata",
];

/// Derived facts about an extracted record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub word_count: usize,
    pub reading_time: String,
    pub source_domain: String,
}

/// Structured payload produced by one extraction program.
///
/// Programs may return any JSON; [`ExtractedRecord::from_value`] folds it into
/// this shape, keeping unrecognised keys in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub url: String,
    pub title: String,
    pub content: String,
    pub publish_date: String,
    pub author: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub metadata: RecordMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtractedRecord {
    /// Validates and defaults an arbitrary payload returned for `target_url`.
    pub fn from_value(value: Value, target_url: &str) -> Self {
        let mut record = ExtractedRecord::default();

        match value {
            Value::Object(map) => {
                for (key, value) in map {
                    record.absorb(key, value);
                }
            }
            Value::Null => {}
            other => record.content = text_of(&other),
        }

        if record.url.trim().is_empty() {
            record.url = target_url.to_string();
        }
        record.recompute_metadata();
        record
    }

    fn absorb(&mut self, key: String, value: Value) {
        match key.as_str() {
            "url" => self.url = text_of(&value),
            "title" => self.title = text_of(&value),
            "content" => self.content = text_of(&value),
            "publish_date" => self.publish_date = text_of(&value),
            "author" => self.author = text_of(&value),
            "summary" => self.summary = text_of(&value),
            "keywords" => self.keywords = keywords_of(&value),
            "metadata" => match value {
                Value::Object(meta) => {
                    for (meta_key, meta_value) in meta {
                        self.absorb_metadata(meta_key, meta_value);
                    }
                }
                other => self.insert_extra("metadata".to_string(), other),
            },
            "word_count" | "reading_time" | "source_domain" => self.absorb_metadata(key, value),
            _ => self.insert_extra(key, value),
        }
    }

    fn absorb_metadata(&mut self, key: String, value: Value) {
        match key.as_str() {
            "word_count" => self.metadata.word_count = value.as_u64().unwrap_or(0) as usize,
            "reading_time" => self.metadata.reading_time = text_of(&value),
            "source_domain" => self.metadata.source_domain = text_of(&value),
            _ => self.insert_extra(key, value),
        }
    }

    /// Keeps an unrecognised value, renaming keys that would shadow a typed
    /// field once `extra` is flattened.
    fn insert_extra(&mut self, key: String, value: Value) {
        let key = if RECORD_FIELDS.contains(&key.as_str()) {
            format!("metadata_{}", key)
        } else {
            key
        };
        self.extra.insert(key, value);
    }

    fn recompute_metadata(&mut self) {
        if self.content.trim().is_empty() {
            self.metadata.word_count = 0;
            self.metadata.reading_time = String::new();
        } else {
            let words = self.content.split_whitespace().count();
            self.metadata.word_count = words;
            let minutes = (words / READING_WORDS_PER_MINUTE).max(1);
            self.metadata.reading_time = format!("{} min", minutes);
        }

        if let Some(host) = Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
        {
            self.metadata.source_domain = host;
        }
    }

    /// True when nothing worth summarizing was extracted.
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty()
            && self.content.trim().is_empty()
            && self.summary.trim().is_empty()
            && self.keywords.is_empty()
            && self.extra.is_empty()
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(text_of)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn keywords_of(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items.iter().map(text_of).collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    };
    raw.into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}
