//! Structure prober: fetches a page and fingerprints its markup.

use std::sync::Arc;

use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::fetch::PageFetcher;

use super::types::{ExtractionStrategy, MetaInfo, StructuralFingerprint};

/// Candidate main-content containers, in preference order.
pub const MAIN_CONTENT_CANDIDATES: &[&str] = &[
    "main",
    "article",
    ".content",
    ".main-content",
    "#content",
    ".post",
    ".entry",
];

/// Candidate text-bearing selectors, in preference order.
pub const TEXT_CANDIDATES: &[&str] = &["p", "h1", "h2", "h3", ".text", ".description", ".summary"];

/// Candidate image selectors, in preference order.
pub const IMAGE_CANDIDATES: &[&str] = &["img", ".image", ".photo", "figure img"];

/// Candidate link selectors, in preference order.
pub const LINK_CANDIDATES: &[&str] = &["a[href]", ".link", ".more-link"];

const MAX_MAIN_CONTENT: usize = 3;
const MAX_TEXT: usize = 5;
const MAX_IMAGE: usize = 3;
const MAX_LINK: usize = 3;

/// Produces one [`StructuralFingerprint`] per URL. Never fails.
#[derive(Clone)]
pub struct StructureProber {
    fetcher: Arc<dyn PageFetcher>,
}

impl StructureProber {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetches `url` and fingerprints it, degrading on any fetch fault.
    pub async fn probe(&self, url: &str) -> StructuralFingerprint {
        match self.fetcher.fetch(url).await {
            Ok(body) => {
                let fingerprint = fingerprint_markup(url, &body);
                info!(
                    url = %url,
                    strategy = %fingerprint.recommended_strategy,
                    elements = fingerprint.meta_info.element_count,
                    "Analyzed page structure"
                );
                fingerprint
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Structure analysis failed, using fallback fingerprint");
                StructuralFingerprint::degraded(url, domain_of(url), e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for StructureProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructureProber").finish_non_exhaustive()
    }
}

/// Builds a fingerprint from already-fetched markup.
///
/// html5ever recovers from any malformed input, so this is infallible.
pub fn fingerprint_markup(url: &str, body: &str) -> StructuralFingerprint {
    let doc = Html::parse_document(body);

    let page_title = first_text(&doc, "title").unwrap_or_else(|| "No title found".to_string());

    let main_content_selectors = matching(&doc, MAIN_CONTENT_CANDIDATES, MAX_MAIN_CONTENT);
    let text_selectors = matching(&doc, TEXT_CANDIDATES, MAX_TEXT);
    let image_selectors = matching(&doc, IMAGE_CANDIDATES, MAX_IMAGE);
    let link_selectors = matching(&doc, LINK_CANDIDATES, MAX_LINK);

    let meta_info = MetaInfo {
        domain: domain_of(url),
        has_json_ld: exists(&doc, r#"script[type="application/ld+json"]"#),
        has_meta_description: exists(&doc, r#"meta[name="description"]"#),
        has_microdata: exists(&doc, "[itemscope], [vocab]"),
        page_lang: first_attr(&doc, "html[lang]", "lang"),
        element_count: count(&doc, "*"),
        error: None,
    };

    let recommended_strategy = recommend(&meta_info, &main_content_selectors, &text_selectors);
    debug!(
        url = %url,
        main = ?main_content_selectors,
        text = ?text_selectors,
        "Selector candidates matched"
    );

    StructuralFingerprint {
        source_url: url.to_string(),
        page_title,
        main_content_selectors,
        text_selectors,
        image_selectors,
        link_selectors,
        meta_info,
        recommended_strategy,
    }
}

/// Strategy priority: JSON-LD, then content containers, then plain text.
pub fn recommend(meta: &MetaInfo, main_content: &[String], text: &[String]) -> ExtractionStrategy {
    if meta.has_json_ld {
        ExtractionStrategy::JsonLd
    } else if !main_content.is_empty() {
        ExtractionStrategy::ContentSelector
    } else if !text.is_empty() {
        ExtractionStrategy::TextExtraction
    } else {
        ExtractionStrategy::GeneralScraping
    }
}

fn domain_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

fn matching(doc: &Html, candidates: &[&str], cap: usize) -> Vec<String> {
    candidates
        .iter()
        .filter(|sel| exists(doc, sel))
        .take(cap)
        .map(|sel| sel.to_string())
        .collect()
}

fn exists(doc: &Html, selector: &str) -> bool {
    Selector::parse(selector)
        .map(|sel| doc.select(&sel).next().is_some())
        .unwrap_or(false)
}

fn count(doc: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|sel| doc.select(&sel).count())
        .unwrap_or(0)
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let text = doc.select(&sel).next()?.text().collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn first_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .next()?
        .value()
        .attr(attr)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
