//! PostgREST store requests against a mocked API.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use shop_vision::EmbeddingVector;
use shopvision_runtime::store::{PostgrestStore, ProductStore, StoreError, UpsertOutcome};
use shopvision_runtime::ProductRecord;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TABLE_PATH: &str = "/rest/v1/products";
const URL: &str = "https://shop.test/p/runner";

fn record(title: &str) -> ProductRecord {
    ProductRecord {
        id: "footshop_eu_7".to_string(),
        source: "footshop_eu".to_string(),
        product_url: URL.to_string(),
        affiliate_url: None,
        image_url: Some("https://static.ftshp.digital/img/p/7/full_product/a.jpg".to_string()),
        compressed_image_url: Some("https://static.ftshp.digital/img/p/7/medium_product/a.jpg".to_string()),
        brand: Some("Acme".to_string()),
        title: title.to_string(),
        description: None,
        category: None,
        gender: None,
        price: Some(49.5),
        currency: "EUR".to_string(),
        country: Some("EU".to_string()),
        size: None,
        second_hand: false,
        tags: Some(vec!["acme".to_string()]),
        metadata: None,
        embedding: Some(EmbeddingVector::new(vec![0.5, 0.5], 2).unwrap()),
        created_at: Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap(),
    }
}

async fn store(server: &MockServer) -> PostgrestStore {
    PostgrestStore::new(&server.uri(), "service-key", "products", Duration::from_secs(5)).unwrap()
}

fn exists_query(found: bool) -> Mock {
    let rows = if found { json!([{"id": "footshop_eu_7"}]) } else { json!([]) };
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("select", "id"))
        .and(query_param("source", "eq.footshop_eu"))
        .and(query_param("product_url", format!("eq.{URL}")))
        .and(header("apikey", "service-key"))
        .and(header("authorization", "Bearer service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
}

#[tokio::test]
async fn test_upsert_inserts_new_product() {
    let server = MockServer::start().await;
    exists_query(false).expect(1).mount(&server).await;
    Mock::given(method("POST"))
        .and(path(TABLE_PATH))
        .and(body_partial_json(json!({"id": "footshop_eu_7", "title": "Runner", "embedding": [0.5, 0.5]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": "footshop_eu_7"}])))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = store(&server).await.upsert(&record("Runner")).await.unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted);
}

#[tokio::test]
async fn test_upsert_updates_existing_product() {
    let server = MockServer::start().await;
    exists_query(true).expect(1).mount(&server).await;
    Mock::given(method("PATCH"))
        .and(path(TABLE_PATH))
        .and(query_param("source", "eq.footshop_eu"))
        .and(query_param("product_url", format!("eq.{URL}")))
        .and(body_partial_json(json!({"title": "Runner v2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "footshop_eu_7"}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = store(&server).await.upsert(&record("Runner v2")).await.unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated);
}

#[tokio::test]
async fn test_count_reads_content_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(header("prefer", "count=exact"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-range", "0-0/1234")
                .set_body_json(json!([{"id": "x"}])),
        )
        .mount(&server)
        .await;

    assert_eq!(store(&server).await.count().await.unwrap(), 1234);
}

#[tokio::test]
async fn test_list_by_source_decodes_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("source", "eq.footshop_eu"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "footshop_eu_7",
            "source": "footshop_eu",
            "product_url": URL,
            "title": "Runner",
            "currency": "EUR",
            "price": 49.5,
            "tags": ["acme"],
            "metadata": "{\"code\":\"AB\"}",
            "embedding": "[0.5,0.5]",
            "created_at": "2026-05-01T12:00:00+00:00"
        }])))
        .mount(&server)
        .await;

    let rows = store(&server).await.list_by_source("footshop_eu", 1000).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "Runner");
    assert_eq!(rows[0].embedding.as_ref().map(|e| e.len()), Some(2));
    assert_eq!(rows[0].metadata.as_deref(), Some("{\"code\":\"AB\"}"));
}

#[tokio::test]
async fn test_delete_reports_match() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(TABLE_PATH))
        .and(query_param("product_url", format!("eq.{URL}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert!(!store(&server).await.delete("footshop_eu", URL).await.unwrap());
}

#[tokio::test]
async fn test_error_classification() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
        .mount(&server)
        .await;

    let s = store(&server).await;
    let err = s.exists("footshop_eu", URL).await.unwrap_err();
    assert!(err.is_outage());
    match s.insert(&record("Runner")).await.unwrap_err() {
        StoreError::Api { status, body } => {
            assert_eq!(status, 409);
            assert_eq!(body, "duplicate key");
        }
        other => panic!("unexpected {other:?}"),
    }

    let unreachable = PostgrestStore::new("http://127.0.0.1:9", "k", "products", Duration::from_secs(2)).unwrap();
    assert!(unreachable.count().await.unwrap_err().is_outage());
}
