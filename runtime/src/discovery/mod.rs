//! Product URL discovery.
//!
//! A [`UrlProvider`] yields the ordered list of product page URLs for a run.
//! The sitemap is the primary provider; a configured static list can stand in
//! when the sitemap is unreachable.

pub mod sitemap;

use async_trait::async_trait;

use crate::acquisition::FetchError;

pub use sitemap::{parse_sitemap, SitemapProvider};

/// Errors from URL discovery.
#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to fetch URL source: {0}")]
    Fetch(#[from] FetchError),

    #[error("malformed sitemap: {0}")]
    Parse(String),

    #[error("{0} URL list is empty")]
    Empty(String),
}

/// A source of candidate product URLs.
#[async_trait]
pub trait UrlProvider: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// All product URLs, in source order.
    async fn list_product_urls(&self) -> Result<Vec<String>, DiscoveryError>;
}

/// A fixed list of URLs, usually loaded from a file.
pub struct StaticUrlProvider {
    urls: Vec<String>,
}

impl StaticUrlProvider {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

#[async_trait]
impl UrlProvider for StaticUrlProvider {
    fn name(&self) -> &str {
        "static list"
    }

    async fn list_product_urls(&self) -> Result<Vec<String>, DiscoveryError> {
        if self.urls.is_empty() {
            return Err(DiscoveryError::Empty(self.name().to_string()));
        }
        Ok(self.urls.clone())
    }
}

/// Tries `primary`, then `secondary`.
///
/// When both fail, or the secondary comes back empty, the primary's error is
/// returned.
pub struct FallbackProvider {
    primary: Box<dyn UrlProvider>,
    secondary: Box<dyn UrlProvider>,
}

impl FallbackProvider {
    pub fn new(primary: Box<dyn UrlProvider>, secondary: Box<dyn UrlProvider>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl UrlProvider for FallbackProvider {
    fn name(&self) -> &str {
        self.primary.name()
    }

    async fn list_product_urls(&self) -> Result<Vec<String>, DiscoveryError> {
        let primary_err = match self.primary.list_product_urls().await {
            Ok(urls) => return Ok(urls),
            Err(e) => e,
        };
        tracing::warn!(
            "{} unavailable ({primary_err}), trying {}",
            self.primary.name(),
            self.secondary.name()
        );

        match self.secondary.list_product_urls().await {
            Ok(urls) if !urls.is_empty() => {
                tracing::info!("using {} URLs from {}", urls.len(), self.secondary.name());
                Ok(urls)
            }
            Ok(_) => Err(primary_err),
            Err(e) => {
                tracing::warn!("{} failed too: {e}", self.secondary.name());
                Err(primary_err)
            }
        }
    }
}

/// Skip `offset` URLs, then keep at most `limit`.
pub fn paginate(urls: Vec<String>, limit: Option<usize>, offset: usize) -> Vec<String> {
    let rest = urls.into_iter().skip(offset);
    match limit {
        Some(n) => rest.take(n).collect(),
        None => rest.collect(),
    }
}
