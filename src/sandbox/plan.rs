//! Declarative extraction plans and their in-process interpreter.
//!
//! A plan is a JSON document naming the `main` entry point and a map of
//! output fields, each pulled from the page by one rule:
//!
//! ```json
//! {
//!   "entry": "main",
//!   "fields": {
//!     "title":   { "selector": "h1" , "fallback": { "meta": "og:title" } },
//!     "content": { "selector": "article p", "many": true, "join": "\n" },
//!     "author":  { "json_ld": "author.name" },
//!     "images":  { "selector": "img", "attr": "src", "many": true, "absolute": true, "limit": 5 },
//!     "keywords":{ "meta": "keywords", "split": "," }
//!   }
//! }
//! ```
//!
//! Plans only reach the page through [`Capabilities`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::error::SandboxError;
use crate::fetch::PageFetcher;

use super::capabilities::Capabilities;
use super::{ProgramDialect, Sandbox};

/// Name every program must expose.
pub const ENTRY_POINT: &str = "main";

/// Format reference embedded in the synthesis prompt.
pub const PLAN_REFERENCE: &str = r#"Return a single JSON object (an extraction plan) of the form:
{
  "entry": "main",
  "fields": {
    "<output field>": {
      "selector": "<CSS selector>"        (or "meta": "<meta name/property>", or "json_ld": "<dot.path>"),
      "attr": "<attribute to read instead of text>",
      "many": true|false,                  (collect every match instead of the first)
      "join": "<separator>",               (join collected matches into one string)
      "pattern": "<regex>",                (keep capture group 1, or the whole match)
      "split": "<separator>",              (split a single string into a list)
      "limit": <max items>,
      "absolute": true|false,              (resolve URLs against the page URL)
      "fallback": { <another rule> }       (tried when this rule yields nothing)
    }
  }
}
Produce the fields: title, content, publish_date, author, summary, keywords, images.
The runtime calls "main" with the target URL, fetches the page and evaluates each rule."#;

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    entry: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, RawRule>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    meta: Option<String>,
    #[serde(default)]
    json_ld: Option<String>,
    #[serde(default)]
    attr: Option<String>,
    #[serde(default)]
    many: bool,
    #[serde(default)]
    join: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    split: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    absolute: bool,
    #[serde(default)]
    fallback: Option<Box<RawRule>>,
}

#[derive(Debug)]
enum Source {
    Css(Selector),
    Meta(Selector),
    JsonLd(Vec<String>),
}

#[derive(Debug)]
struct Rule {
    source: Source,
    attr: Option<String>,
    many: bool,
    join: Option<String>,
    pattern: Option<Regex>,
    split: Option<String>,
    limit: Option<usize>,
    absolute: bool,
    fallback: Option<Box<Rule>>,
}

/// A validated plan, ready to evaluate against page markup.
#[derive(Debug)]
pub struct CompiledPlan {
    fields: Vec<(String, Rule)>,
}

impl CompiledPlan {
    /// Parses and validates plan text.
    ///
    /// Malformed JSON, unknown rule keys, bad selectors or patterns are
    /// [`SandboxError::Syntax`]; a plan without the `main` entry is
    /// [`SandboxError::EntryPointMissing`].
    pub fn compile(text: &str, caps: &Capabilities) -> Result<Self, SandboxError> {
        let raw: RawPlan = serde_json::from_str(text.trim())
            .map_err(|e| SandboxError::Syntax(format!("plan is not valid JSON: {}", e)))?;

        if raw.entry.as_deref() != Some(ENTRY_POINT) {
            return Err(SandboxError::EntryPointMissing(ENTRY_POINT.to_string()));
        }
        if raw.fields.is_empty() {
            return Err(SandboxError::Syntax("plan declares no fields".to_string()));
        }

        let fields = raw
            .fields
            .into_iter()
            .map(|(name, rule)| {
                let compiled = compile_rule(rule, caps)
                    .map_err(|e| SandboxError::Syntax(format!("field '{}': {}", name, e)))?;
                Ok((name, compiled))
            })
            .collect::<Result<Vec<_>, SandboxError>>()?;

        Ok(Self { fields })
    }

    /// Number of output fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Evaluates every field against `html` fetched from `page_url`.
    pub fn evaluate(&self, html: &str, page_url: &Url, caps: &Capabilities) -> Value {
        let doc = caps.parse_markup(html);
        let json_ld = json_ld_blocks(&doc, caps);

        let mut out = Map::new();
        for (name, rule) in &self.fields {
            out.insert(name.clone(), rule.evaluate(&doc, &json_ld, page_url, caps));
        }
        out.entry("url".to_string())
            .or_insert_with(|| Value::String(page_url.to_string()));
        Value::Object(out)
    }
}

fn compile_rule(raw: RawRule, caps: &Capabilities) -> Result<Rule, SandboxError> {
    let source = match (raw.selector, raw.meta, raw.json_ld) {
        (Some(sel), None, None) => Source::Css(caps.compile_selector(&sel)?),
        (None, Some(name), None) => {
            if name.contains('"') {
                return Err(SandboxError::Syntax(format!("invalid meta name '{}'", name)));
            }
            Source::Meta(caps.compile_selector(&format!(
                "meta[name=\"{0}\"], meta[property=\"{0}\"]",
                name
            ))?)
        }
        (None, None, Some(path)) => Source::JsonLd(
            path.split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => {
            return Err(SandboxError::Syntax(
                "rule needs exactly one of 'selector', 'meta' or 'json_ld'".to_string(),
            ))
        }
    };

    let pattern = raw
        .pattern
        .as_deref()
        .map(|p| caps.compile_regex(p))
        .transpose()?;
    let fallback = raw
        .fallback
        .map(|f| compile_rule(*f, caps).map(Box::new))
        .transpose()?;

    Ok(Rule {
        source,
        attr: raw.attr,
        many: raw.many,
        join: raw.join,
        pattern,
        split: raw.split,
        limit: raw.limit,
        absolute: raw.absolute,
        fallback,
    })
}

impl Rule {
    fn evaluate(&self, doc: &Html, json_ld: &[Value], page_url: &Url, caps: &Capabilities) -> Value {
        let values = self.collect(doc, json_ld, page_url, caps);
        if values.is_empty() {
            if let Some(ref fallback) = self.fallback {
                return fallback.evaluate(doc, json_ld, page_url, caps);
            }
        }
        self.shape(values)
    }

    fn collect(&self, doc: &Html, json_ld: &[Value], page_url: &Url, caps: &Capabilities) -> Vec<String> {
        let wanted = if self.many || self.join.is_some() {
            self.limit.unwrap_or(usize::MAX)
        } else {
            1
        };

        let raw: Box<dyn Iterator<Item = String> + '_> = match &self.source {
            Source::Css(selector) => Box::new(
                doc.select(selector)
                    .filter_map(move |el| self.read_element(el)),
            ),
            Source::Meta(selector) => Box::new(
                doc.select(selector)
                    .filter_map(|el| el.value().attr("content").map(str::to_string)),
            ),
            Source::JsonLd(path) => Box::new(
                json_ld
                    .iter()
                    .flat_map(move |block| lookup_path(block, path))
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
        };

        raw.map(|v| collapse_whitespace(&v))
            .filter_map(|v| self.apply_pattern(v))
            .map(|v| {
                if self.absolute {
                    caps.join_url(page_url, &v)
                } else {
                    v
                }
            })
            .filter(|v| !v.is_empty())
            .take(wanted)
            .collect()
    }

    fn read_element(&self, el: ElementRef<'_>) -> Option<String> {
        match self.attr {
            Some(ref attr) => el.value().attr(attr).map(str::to_string),
            None => Some(el.text().collect::<Vec<_>>().join(" ")),
        }
    }

    fn apply_pattern(&self, value: String) -> Option<String> {
        match self.pattern {
            None => Some(value),
            Some(ref re) => re.captures(&value).map(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            }),
        }
    }

    fn shape(&self, values: Vec<String>) -> Value {
        if let Some(ref sep) = self.join {
            return Value::String(values.join(sep));
        }
        if self.many {
            return Value::Array(values.into_iter().map(Value::String).collect());
        }
        let first = values.into_iter().next().unwrap_or_default();
        match self.split {
            Some(ref sep) => Value::Array(
                first
                    .split(sep.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .take(self.limit.unwrap_or(usize::MAX))
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ),
            None => Value::String(first),
        }
    }
}

fn json_ld_blocks(doc: &Html, caps: &Capabilities) -> Vec<Value> {
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };
    let mut blocks = Vec::new();
    for script in doc.select(&selector) {
        let text = script.text().collect::<String>();
        let Some(value) = caps.decode_json(&text) else {
            continue;
        };
        flatten_json_ld(value, &mut blocks);
    }
    blocks
}

fn flatten_json_ld(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten_json_ld(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_json_ld(graph, out);
            }
            if !map.is_empty() {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn lookup_path(value: &Value, path: &[String]) -> Vec<String> {
    let Some((head, rest)) = path.split_first() else {
        return leaf_strings(value);
    };
    match value {
        Value::Object(map) => map.get(head).map(|v| lookup_path(v, rest)).unwrap_or_default(),
        Value::Array(items) => match head.parse::<usize>() {
            Ok(idx) => items.get(idx).map(|v| lookup_path(v, rest)).unwrap_or_default(),
            Err(_) => items.iter().flat_map(|v| lookup_path(v, path)).collect(),
        },
        _ => Vec::new(),
    }
}

fn leaf_strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Bool(b) => vec![b.to_string()],
        Value::Array(items) => items.iter().flat_map(leaf_strings).collect(),
        Value::Object(map) => map
            .get("name")
            .or_else(|| map.get("url"))
            .or_else(|| map.get("@id"))
            .map(leaf_strings)
            .unwrap_or_default(),
        Value::Null => Vec::new(),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Default sandbox: interprets extraction plans in-process.
pub struct PlanSandbox {
    caps: Capabilities,
}

impl PlanSandbox {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            caps: Capabilities::new(fetcher),
        }
    }
}

#[async_trait]
impl Sandbox for PlanSandbox {
    fn dialect(&self) -> ProgramDialect {
        ProgramDialect::ExtractionPlan
    }

    async fn run(&self, program: &str, target_url: &str) -> Result<Value, SandboxError> {
        let plan = CompiledPlan::compile(program, &self.caps)?;
        let page_url = self.caps.parse_url(target_url)?;

        tracing::debug!(url = %page_url, fields = plan.field_count(), "Running extraction plan");
        let html = self.caps.http_get(page_url.as_str()).await?;
        Ok(plan.evaluate(&html, &page_url, &self.caps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use serde_json::json;
    use std::collections::HashMap;

    const PAGE: &str = r#"<html lang="en"><head>
        <title>Chip news</title>
        <meta name="keywords" content="ai, chips, fabs">
        <meta property="og:title" content="OG Chip headline">
        <script type="application/ld+json">
          {"@context":"https://schema.org","@graph":[{"@type":"NewsArticle","headline":"LD headline","author":{"@type":"Person","name":"Ada"},"datePublished":"2024-05-01"}]}
        </script>
        </head><body>
        <article><h1> Chips   are back </h1>
          <p>First paragraph.</p><p>Second paragraph.</p>
          <img src="/img/a.png"><img src="https://cdn.test/b.png">
          <span class="price">Price: $42.50</span>
        </article></body></html>"#;

    struct MapFetcher(HashMap<String, String>);

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.0.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn sandbox() -> PlanSandbox {
        let mut pages = HashMap::new();
        pages.insert("https://news.test/story".to_string(), PAGE.to_string());
        PlanSandbox::new(Arc::new(MapFetcher(pages)))
    }

    #[tokio::test]
    async fn test_plan_extracts_fields() {
        let plan = json!({
            "entry": "main",
            "fields": {
                "title": {"selector": "h1"},
                "content": {"selector": "article p", "many": true, "join": "\n"},
                "images": {"selector": "img", "attr": "src", "many": true, "absolute": true},
                "keywords": {"meta": "keywords", "split": ","},
                "author": {"json_ld": "author.name"},
                "publish_date": {"json_ld": "datePublished"},
                "price": {"selector": ".price", "pattern": "\\$([0-9.]+)"}
            }
        })
        .to_string();

        let value = sandbox()
            .run(&plan, "https://news.test/story")
            .await
            .expect("plan should run");

        assert_eq!(value["title"], "Chips are back");
        assert_eq!(value["content"], "First paragraph.\nSecond paragraph.");
        assert_eq!(
            value["images"],
            json!(["https://news.test/img/a.png", "https://cdn.test/b.png"])
        );
        assert_eq!(value["keywords"], json!(["ai", "chips", "fabs"]));
        assert_eq!(value["author"], "Ada");
        assert_eq!(value["publish_date"], "2024-05-01");
        assert_eq!(value["price"], "42.50");
        assert_eq!(value["url"], "https://news.test/story");
    }

    #[tokio::test]
    async fn test_fallback_rule_used_when_primary_is_empty() {
        let plan = json!({
            "entry": "main",
            "fields": {
                "summary": {"selector": ".summary", "fallback": {"meta": "og:title"}},
                "missing": {"selector": ".nothing"}
            }
        })
        .to_string();

        let value = sandbox()
            .run(&plan, "https://news.test/story")
            .await
            .expect("plan should run");
        assert_eq!(value["summary"], "OG Chip headline");
        assert_eq!(value["missing"], "");
    }

    #[tokio::test]
    async fn test_malformed_plan_is_syntax_error() {
        let err = sandbox()
            .run("def main(url): pass", "https://news.test/story")
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Syntax(_)));

        let bad_selector = json!({"entry": "main", "fields": {"t": {"selector": "h1[["}}}).to_string();
        let err = sandbox()
            .run(&bad_selector, "https://news.test/story")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("field 't'"));

        let two_sources = json!({"entry": "main", "fields": {"t": {"selector": "h1", "meta": "x"}}}).to_string();
        assert!(matches!(
            sandbox().run(&two_sources, "https://news.test/story").await,
            Err(SandboxError::Syntax(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_entry_point() {
        let plan = json!({"fields": {"title": {"selector": "h1"}}}).to_string();
        let err = sandbox()
            .run(&plan, "https://news.test/story")
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::EntryPointMissing(ref e) if e == "main"));
    }

    #[tokio::test]
    async fn test_unreachable_target_is_capability_error() {
        let plan = json!({"entry": "main", "fields": {"title": {"selector": "h1"}}}).to_string();
        let err = sandbox()
            .run(&plan, "https://news.test/gone")
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Capability { capability: "http_fetch", .. }));
    }

    #[test]
    fn test_lookup_path_walks_arrays() {
        let value = json!({"image": [{"url": "a"}, {"url": "b"}], "list": ["x", "y"]});
        assert_eq!(lookup_path(&value, &["image".to_string(), "url".to_string()]), vec!["a", "b"]);
        assert_eq!(lookup_path(&value, &["list".to_string(), "1".to_string()]), vec!["y"]);
    }
}
