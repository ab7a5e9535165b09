//! Parse sitemap.xml `urlset` documents.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

use super::{DiscoveryError, UrlProvider};
use crate::acquisition::HttpClient;

/// Namespace of the sitemaps.org 0.9 protocol.
const SITEMAP_NS: &[u8] = b"http://www.sitemaps.org/schemas/sitemap/0.9";

/// True for elements in the sitemap namespace, or in no namespace at all.
fn is_sitemap_element(ns: &ResolveResult) -> bool {
    match ns {
        ResolveResult::Bound(Namespace(uri)) => *uri == SITEMAP_NS,
        ResolveResult::Unbound => true,
        ResolveResult::Unknown(_) => false,
    }
}

/// Every `<loc>` inside a `<url>` entry, in document order.
///
/// Names are resolved through their namespace, so prefixed documents
/// (`<sm:urlset xmlns:sm=...>`) parse and extension elements such as
/// `image:loc` are skipped. The document must have a `urlset` root;
/// anything else (including an HTML error page) is rejected.
pub fn parse_sitemap(xml: &str) -> Result<Vec<String>, DiscoveryError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut urls = Vec::new();
    let mut buf = Vec::new();

    let mut seen_urlset = false;
    let mut in_url = false;
    let mut in_loc = false;
    let mut current_loc = String::new();

    loop {
        let (ns, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| DiscoveryError::Parse(e.to_string()))?;
        match event {
            Event::Start(e) => {
                in_loc = false;
                if is_sitemap_element(&ns) {
                    match e.local_name().as_ref() {
                        b"urlset" => seen_urlset = true,
                        b"url" => {
                            in_url = true;
                            current_loc.clear();
                        }
                        b"loc" => in_loc = in_url,
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                if in_url && is_sitemap_element(&ns) && e.local_name().as_ref() == b"url" {
                    if !current_loc.is_empty() {
                        urls.push(std::mem::take(&mut current_loc));
                    }
                    in_url = false;
                }
                in_loc = false;
            }
            Event::Text(e) if in_loc => {
                let text = e
                    .unescape()
                    .map_err(|err| DiscoveryError::Parse(err.to_string()))?;
                current_loc.push_str(text.trim());
            }
            Event::CData(e) if in_loc => {
                current_loc.push_str(String::from_utf8_lossy(&e).trim());
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_urlset {
        return Err(DiscoveryError::Parse("no <urlset> element".to_string()));
    }
    Ok(urls)
}

/// Product URLs from the source's sitemap.
pub struct SitemapProvider {
    http: HttpClient,
    url: String,
}

impl SitemapProvider {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }
}

#[async_trait]
impl UrlProvider for SitemapProvider {
    fn name(&self) -> &str {
        "sitemap"
    }

    async fn list_product_urls(&self) -> Result<Vec<String>, DiscoveryError> {
        let xml = self.http.get_text(&self.url).await?;
        let urls = parse_sitemap(&xml)?;
        tracing::info!("found {} product URLs in sitemap {}", urls.len(), self.url);
        Ok(urls)
    }
}
