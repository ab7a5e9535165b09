//! Supabase / PostgREST product table over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;

use super::{validate_table_name, ProductStore, StoreError};
use crate::product::ProductRecord;

const REPRESENTATION: &str = "return=representation";

/// Product table behind a PostgREST endpoint (`{url}/rest/v1/{table}`).
pub struct PostgrestStore {
    client: reqwest::Client,
    endpoint: String,
}

impl PostgrestStore {
    /// `url` is the project root, e.g. `https://abc.supabase.co`.
    pub fn new(url: &str, key: &str, table: &str, timeout: Duration) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        let bad_key = |_: InvalidHeaderValue| StoreError::Config("API key is not a valid header value".to_string());

        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(key).map_err(bad_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(bad_key)?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/{table}", url.trim_end_matches('/')),
        })
    }

    fn request(&self, method: Method) -> RequestBuilder {
        self.client.request(method, &self.endpoint)
    }

    fn by_key(&self, method: Method, source: &str, product_url: &str) -> RequestBuilder {
        self.request(method).query(&[
            ("source", format!("eq.{source}")),
            ("product_url", format!("eq.{product_url}")),
        ])
    }
}

/// Send and classify failures: transport errors and 5xx are outages, other
/// non-2xx statuses are per-request rejections.
async fn send(req: RequestBuilder) -> Result<Response, StoreError> {
    let resp = req
        .send()
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status.is_server_error() {
        Err(StoreError::Unavailable(format!("HTTP {}: {body}", status.as_u16())))
    } else {
        Err(StoreError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

async fn rows<T: serde::de::DeserializeOwned>(resp: Response) -> Result<Vec<T>, StoreError> {
    resp.json::<Vec<T>>()
        .await
        .map_err(|e| StoreError::Decode(e.to_string()))
}

/// Total from a `Content-Range` header such as `0-0/42` or `*/0`.
fn content_range_total(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl ProductStore for PostgrestStore {
    fn backend(&self) -> &str {
        "postgrest"
    }

    async fn exists(&self, source: &str, product_url: &str) -> Result<bool, StoreError> {
        let req = self
            .by_key(Method::GET, source, product_url)
            .query(&[("select", "id"), ("limit", "1")]);
        Ok(!rows::<Value>(send(req).await?).await?.is_empty())
    }

    async fn insert(&self, record: &ProductRecord) -> Result<(), StoreError> {
        let req = self
            .request(Method::POST)
            .header("Prefer", REPRESENTATION)
            .json(record);
        send(req).await?;
        Ok(())
    }

    async fn update(&self, record: &ProductRecord) -> Result<bool, StoreError> {
        let req = self
            .by_key(Method::PATCH, &record.source, &record.product_url)
            .header("Prefer", REPRESENTATION)
            .json(record);
        Ok(!rows::<Value>(send(req).await?).await?.is_empty())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let req = self
            .request(Method::GET)
            .query(&[("select", "id"), ("limit", "1")])
            .header("Prefer", "count=exact");
        let resp = send(req).await?;
        resp.headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
            .ok_or_else(|| StoreError::Decode("missing or invalid Content-Range".to_string()))
    }

    async fn list_by_source(&self, source: &str, limit: usize) -> Result<Vec<ProductRecord>, StoreError> {
        let req = self.request(Method::GET).query(&[
            ("select", "*".to_string()),
            ("source", format!("eq.{source}")),
            ("limit", limit.to_string()),
        ]);
        rows(send(req).await?).await
    }

    async fn delete(&self, source: &str, product_url: &str) -> Result<bool, StoreError> {
        let req = self
            .by_key(Method::DELETE, source, product_url)
            .header("Prefer", REPRESENTATION);
        Ok(!rows::<Value>(send(req).await?).await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_total() {
        assert_eq!(content_range_total("0-0/42"), Some(42));
        assert_eq!(content_range_total("*/0"), Some(0));
        assert_eq!(content_range_total("0-9/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }

    #[test]
    fn test_endpoint_and_validation() {
        let store = PostgrestStore::new("https://abc.supabase.co/", "k", "products", Duration::from_secs(1)).unwrap();
        assert_eq!(store.endpoint, "https://abc.supabase.co/rest/v1/products");
        assert!(PostgrestStore::new("https://abc.supabase.co", "k", "bad name", Duration::from_secs(1)).is_err());
        assert!(PostgrestStore::new("https://abc.supabase.co", "bad\nkey", "products", Duration::from_secs(1)).is_err());
    }
}
