//! Product page extraction.
//!
//! A product page carries its data in an embedded JSON block (the
//! `ProductDetail` hypernova payload). That payload is the primary source;
//! a few fields it lacks are derived from the surrounding HTML and only fill
//! gaps.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use super::http_client::{FetchError, HttpClient};
use crate::config::SourceProfile;
use crate::extraction::sanitize_text;
use crate::product::RawProduct;

const PRODUCT_BLOCK_SELECTOR: &str =
    r#"script[type="application/json"][data-hypernova-key="ProductDetail"]"#;
const DESCRIPTION_SELECTOR: &str = r#"div[data-testid="product-description"]"#;
const BREADCRUMB_SELECTOR: &str = r#"ul[class*="Breadcrumbs_breadcrumbs"]"#;

/// URL path markers for each gender, checked in order.
const GENDER_PATTERNS: &[(&str, &[&str])] = &[
    ("women", &["/womens-", "/women-s-"]),
    ("men", &["/mens-", "/men-s-"]),
    ("unisex", &["/unisex-"]),
];

/// Why a page produced no product.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no product detail block on page")]
    MissingDataBlock,

    #[error("malformed product JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("product detail block has no product object")]
    MissingProduct,

    #[error("invalid selector {0}")]
    Selector(String),
}

/// Parse a fetched product page into raw product fields.
///
/// `url` is the page's own URL; it becomes `product_url` and feeds gender
/// inference.
pub fn parse_product_page(
    html: &str,
    url: &str,
    profile: &SourceProfile,
) -> Result<RawProduct, ExtractError> {
    let document = Html::parse_document(html);

    let block = document
        .select(&selector(PRODUCT_BLOCK_SELECTOR)?)
        .next()
        .ok_or(ExtractError::MissingDataBlock)?;
    let payload = strip_comment(&block.text().collect::<String>()).to_string();
    let data: Value = serde_json::from_str(&payload)?;

    let mut raw = data
        .get("data")
        .and_then(|d| d.get("product_data"))
        .cloned()
        .and_then(RawProduct::from_json)
        .filter(|p| p.keys().next().is_some())
        .ok_or(ExtractError::MissingProduct)?;

    raw.insert("product_url", url);
    raw.insert("source", profile.source.as_str());

    if let Some(description) = description(&document)? {
        raw.fill("description", description);
    }
    if let Some(category) = breadcrumb_category(&document)? {
        raw.fill("category", category);
    }
    if let Some(gender) = gender_from_url(url) {
        raw.fill("gender", gender);
    }
    raw.fill("country", profile.country.as_str());

    Ok(raw)
}

/// Gender implied by the product URL, if any.
pub fn gender_from_url(url: &str) -> Option<&'static str> {
    let url = url.to_lowercase();
    GENDER_PATTERNS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| url.contains(m)))
        .map(|(gender, _)| *gender)
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|_| ExtractError::Selector(css.to_string()))
}

/// The payload is sometimes wrapped as `<!--{...}-->`.
fn strip_comment(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix("<!--").unwrap_or(text);
    text.strip_suffix("-->").unwrap_or(text).trim()
}

fn description(document: &Html) -> Result<Option<String>, ExtractError> {
    let Some(container) = document.select(&selector(DESCRIPTION_SELECTOR)?).next() else {
        return Ok(None);
    };
    let joined = container
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let text = sanitize_text(&joined, None);
    Ok((!text.is_empty()).then_some(text))
}

fn breadcrumb_category(document: &Html) -> Result<Option<String>, ExtractError> {
    let Some(list) = document.select(&selector(BREADCRUMB_SELECTOR)?).next() else {
        return Ok(None);
    };
    let links: Vec<ElementRef> = list.select(&selector("a")?).collect();
    if links.len() < 2 {
        return Ok(None);
    }
    Ok(links
        .last()
        .map(|a| a.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty()))
}

/// Fetches and parses product pages for one source.
#[derive(Clone)]
pub struct PageExtractor {
    http: HttpClient,
    profile: SourceProfile,
}

impl PageExtractor {
    pub fn new(http: HttpClient, profile: SourceProfile) -> Self {
        Self { http, profile }
    }

    /// Fetch and parse `url`.
    pub async fn extract(&self, url: &str) -> Result<RawProduct, ExtractError> {
        let html = self.http.get_text(url).await?;
        parse_product_page(&html, url, &self.profile)
    }

    /// As [`PageExtractor::extract`], logging the failure and returning
    /// `None` instead.
    pub async fn scrape_product(&self, url: &str) -> Option<RawProduct> {
        match self.extract(url).await {
            Ok(raw) => {
                tracing::debug!("extracted {} from {url}", raw.label());
                Some(raw)
            }
            Err(e) => {
                tracing::warn!("failed to extract product from {url}: {e}");
                None
            }
        }
    }
}
