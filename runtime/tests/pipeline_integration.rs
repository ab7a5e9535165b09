//! End-to-end pipeline runs against mocked sitemap, pages and images.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageFormat, RgbImage};
use serde_json::json;
use shop_vision::{ImageEmbedder, VisionResult};
use shopvision_runtime::acquisition::{HttpClient, PageExtractor};
use shopvision_runtime::config::{RetryPolicy, SourceProfile};
use shopvision_runtime::discovery::{FallbackProvider, SitemapProvider, StaticUrlProvider, UrlProvider};
use shopvision_runtime::extraction::RecordMapper;
use shopvision_runtime::imaging::ImageProcessor;
use shopvision_runtime::store::{PostgrestStore, ProductStore, SqliteStore};
use shopvision_runtime::Pipeline;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIM: usize = 768;

struct ConstantEmbedder;

impl ImageEmbedder for ConstantEmbedder {
    fn input_size(&self) -> u32 {
        16
    }
    fn dimension(&self) -> usize {
        DIM
    }
    fn embed(&self, _image: &RgbImage) -> VisionResult<Vec<f32>> {
        Ok(vec![1.0 / (DIM as f32).sqrt(); DIM])
    }
}

/// Records when each embedding call happens.
#[derive(Default)]
struct TimedEmbedder {
    calls: Mutex<Vec<Instant>>,
}

impl ImageEmbedder for TimedEmbedder {
    fn input_size(&self) -> u32 {
        16
    }
    fn dimension(&self) -> usize {
        DIM
    }
    fn embed(&self, _image: &RgbImage) -> VisionResult<Vec<f32>> {
        self.calls.lock().unwrap().push(Instant::now());
        Ok(vec![1.0 / (DIM as f32).sqrt(); DIM])
    }
}

fn client() -> HttpClient {
    HttpClient::new(
        Duration::from_secs(5),
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
        },
        Duration::ZERO,
    )
    .unwrap()
}

fn png() -> Vec<u8> {
    let img = RgbImage::from_pixel(32, 24, image::Rgb([10, 120, 200]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn product_page(id: u32, name: &str, image: &str) -> String {
    let payload = json!({
        "data": {
            "product_data": {
                "id": id,
                "name": name,
                "manufacturer": {"name": "Acme"},
                "price": {"value": 59.9, "currency_code": "EUR"},
                "image": image
            }
        }
    });
    format!(
        r#"<html><body>
        <script type="application/json" data-hypernova-key="ProductDetail"><!--{payload}--></script>
        <div data-testid="product-description"><p>Suede upper</p></div>
        </body></html>"#
    )
}

fn sitemap(urls: &[String]) -> String {
    let entries: String = urls
        .iter()
        .map(|u| format!("<url><loc>{u}</loc></url>"))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{entries}</urlset>"#
    )
}

async fn mount(server: &MockServer, at: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(template)
        .mount(server)
        .await;
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

/// Five products: two extract, one page is gone, one has no data block,
/// one has only a broken image.
async fn mixed_site() -> (MockServer, Vec<String>) {
    let server = MockServer::start().await;
    let base = server.uri();
    let urls: Vec<String> = (1..=5).map(|i| format!("{base}/p/{i}")).collect();

    mount(&server, "/sitemap.xml", ResponseTemplate::new(200).set_body_string(sitemap(&urls))).await;
    mount(&server, "/p/1", html(product_page(1, "One", &format!("{base}/img/1.png")))).await;
    mount(&server, "/p/2", ResponseTemplate::new(404)).await;
    mount(&server, "/p/3", html("<html><body>maintenance</body></html>".to_string())).await;
    mount(&server, "/p/4", html(product_page(4, "Four", &format!("{base}/img/missing.jpg")))).await;
    mount(&server, "/p/5", html(product_page(5, "Five", &format!("{base}/img/5.png")))).await;
    for img in ["/img/1.png", "/img/5.png"] {
        mount(
            &server,
            img,
            ResponseTemplate::new(200).set_body_raw(png(), "image/png"),
        )
        .await;
    }
    mount(&server, "/img/missing.jpg", ResponseTemplate::new(404)).await;

    (server, urls)
}

fn pipeline(urls: Box<dyn UrlProvider>, store: Arc<dyn ProductStore>) -> Pipeline {
    pipeline_with(urls, store, Arc::new(ConstantEmbedder))
        .with_concurrency(3)
        .with_pacing_delay(Duration::ZERO)
}

fn pipeline_with(
    urls: Box<dyn UrlProvider>,
    store: Arc<dyn ProductStore>,
    engine: Arc<dyn ImageEmbedder>,
) -> Pipeline {
    let profile = SourceProfile {
        source: "test_shop".to_string(),
        ..SourceProfile::default()
    };
    Pipeline::new(
        urls,
        PageExtractor::new(client(), profile.clone()),
        ImageProcessor::new(client(), engine, DIM),
        RecordMapper::new(profile),
        store,
    )
}

fn gaps(calls: &[Instant]) -> Vec<Duration> {
    calls.windows(2).map(|w| w[1] - w[0]).collect()
}

fn sitemap_provider(server: &MockServer) -> Box<dyn UrlProvider> {
    Box::new(SitemapProvider::new(client(), format!("{}/sitemap.xml", server.uri())))
}

#[tokio::test]
async fn test_partial_failures_store_only_complete_products() {
    let (server, _) = mixed_site().await;
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ProductStore> =
        Arc::new(SqliteStore::open(&dir.path().join("products.db"), "products").unwrap());

    let report = pipeline(sitemap_provider(&server), store.clone())
        .scrape_all(2, None, 0)
        .await
        .unwrap();

    assert_eq!(report.discovered, 5);
    assert_eq!(report.batches, 3);
    assert_eq!(report.extracted, 3);
    assert_eq!(report.embedded, 2);
    assert_eq!(report.persisted, 2);
    assert_eq!(report.failed_batches, 0);

    let mut stored = store.list_by_source("test_shop", 10).await.unwrap();
    stored.sort_by(|a, b| a.id.cmp(&b.id));
    let ids: Vec<&str> = stored.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["test_shop_1", "test_shop_5"]);
    for record in &stored {
        assert_eq!(record.embedding.as_ref().map(|e| e.len()), Some(DIM));
        assert_eq!(record.brand.as_deref(), Some("Acme"));
        assert_eq!(record.description.as_deref(), Some("Suede upper"));
        assert_eq!(record.price, Some(59.9));
    }
}

#[tokio::test]
async fn test_rerun_updates_instead_of_duplicating() {
    let (server, _) = mixed_site().await;
    let store: Arc<dyn ProductStore> = Arc::new(SqliteStore::open_in_memory("products").unwrap());

    let first = pipeline(sitemap_provider(&server), store.clone())
        .scrape_all(5, None, 0)
        .await
        .unwrap();
    let second = pipeline(sitemap_provider(&server), store.clone())
        .scrape_all(5, None, 0)
        .await
        .unwrap();

    assert_eq!(first.persisted, 2);
    assert_eq!(second.persisted, 2);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_limit_and_offset_slice_the_url_list() {
    let (server, _) = mixed_site().await;
    let store: Arc<dyn ProductStore> = Arc::new(SqliteStore::open_in_memory("products").unwrap());

    let report = pipeline(sitemap_provider(&server), store.clone())
        .scrape_all(5, Some(2), 3)
        .await
        .unwrap();

    // p/4 (broken image) and p/5
    assert_eq!(report.discovered, 2);
    assert_eq!(report.persisted, 1);
    assert!(store.exists("test_shop", &format!("{}/p/5", server.uri())).await.unwrap());
}

#[tokio::test]
async fn test_fallback_list_used_when_sitemap_down() {
    let (_server, urls) = mixed_site().await;
    let down = MockServer::start().await;
    mount(&down, "/sitemap.xml", ResponseTemplate::new(503)).await;

    let provider = FallbackProvider::new(
        Box::new(SitemapProvider::new(client(), format!("{}/sitemap.xml", down.uri()))),
        Box::new(StaticUrlProvider::new(vec![urls[0].clone(), urls[4].clone()])),
    );
    let store: Arc<dyn ProductStore> = Arc::new(SqliteStore::open_in_memory("products").unwrap());

    let report = pipeline(Box::new(provider), store).scrape_all(5, None, 0).await.unwrap();
    assert_eq!(report.discovered, 2);
    assert_eq!(report.persisted, 2);
}

#[tokio::test]
async fn test_discovery_failure_is_fatal() {
    let down = MockServer::start().await;
    mount(&down, "/sitemap.xml", ResponseTemplate::new(500)).await;
    let store: Arc<dyn ProductStore> = Arc::new(SqliteStore::open_in_memory("products").unwrap());

    let result = pipeline(sitemap_provider(&down), store.clone())
        .scrape_all(5, None, 0)
        .await;
    assert!(result.is_err());
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_store_outage_fails_batches_but_not_the_run() {
    let (server, _) = mixed_site().await;
    let db = MockServer::start().await;
    Mock::given(path("/rest/v1/products"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&db)
        .await;
    let store: Arc<dyn ProductStore> =
        Arc::new(PostgrestStore::new(&db.uri(), "key", "products", Duration::from_secs(5)).unwrap());

    let report = pipeline(sitemap_provider(&server), store)
        .scrape_all(1, None, 0)
        .await
        .unwrap();

    assert_eq!(report.batches, 5);
    // only batches that reached the store can fail there
    assert_eq!(report.failed_batches, 2);
    assert_eq!(report.persisted, 0);
}

#[tokio::test]
async fn test_single_product() {
    let (server, urls) = mixed_site().await;
    let store: Arc<dyn ProductStore> = Arc::new(SqliteStore::open_in_memory("products").unwrap());
    let p = pipeline(sitemap_provider(&server), store.clone());

    let (record, _) = p.scrape_single_product(&urls[0]).await.unwrap();
    assert_eq!(record.id, "test_shop_1");
    assert_eq!(record.title, "One");
    assert!(p.scrape_single_product(&urls[3]).await.is_err());
    assert!(p.scrape_single_product(&urls[1]).await.is_err());

    let stats = p.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.source_count, 1);
    assert_eq!(stats.backend, "sqlite");
}

#[tokio::test]
async fn test_pacing_between_embeddings_and_batches() {
    let (_server, urls) = mixed_site().await;
    let pacing = Duration::from_millis(150);
    let good = vec![urls[0].clone(), urls[4].clone()];

    // both products in one batch: pause between the two embedding calls
    let engine = Arc::new(TimedEmbedder::default());
    let store: Arc<dyn ProductStore> = Arc::new(SqliteStore::open_in_memory("products").unwrap());
    let report = pipeline_with(Box::new(StaticUrlProvider::new(good.clone())), store, engine.clone())
        .with_pacing_delay(pacing)
        .scrape_all(2, None, 0)
        .await
        .unwrap();
    assert_eq!(report.batches, 1);
    assert_eq!(report.persisted, 2);
    let calls = engine.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert!(gaps(&calls).iter().all(|gap| *gap >= pacing));

    // one product per batch: pause between batches
    let engine = Arc::new(TimedEmbedder::default());
    let store: Arc<dyn ProductStore> = Arc::new(SqliteStore::open_in_memory("products").unwrap());
    let report = pipeline_with(Box::new(StaticUrlProvider::new(good)), store, engine.clone())
        .with_pacing_delay(pacing)
        .scrape_all(1, None, 0)
        .await
        .unwrap();
    assert_eq!(report.batches, 2);
    let calls = engine.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert!(gaps(&calls).iter().all(|gap| *gap >= pacing));
}

#[tokio::test]
async fn test_extraction_runs_at_most_concurrency_pages_at_once() {
    let server = MockServer::start().await;
    let delay = Duration::from_millis(200);
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><body>no data</body></html>", "text/html; charset=utf-8")
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    let urls: Vec<String> = (1..=6).map(|i| format!("{}/slow/{i}", server.uri())).collect();
    let store: Arc<dyn ProductStore> = Arc::new(SqliteStore::open_in_memory("products").unwrap());

    let p = pipeline_with(Box::new(StaticUrlProvider::new(urls.clone())), store, Arc::new(ConstantEmbedder))
        .with_concurrency(2)
        .with_pacing_delay(Duration::ZERO);

    let start = Instant::now();
    let batch = p.scrape_product_batch(&urls).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(batch.extracted, 0);
    assert_eq!(server.received_requests().await.map(|r| r.len()), Some(6));
    // six slow pages through two workers take at least three rounds
    assert!(elapsed >= delay * 3, "finished in {elapsed:?}");
}
