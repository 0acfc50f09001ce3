//! Integration tests for catalogue reconciliation over HTTP, using wiremock

use core::time::Duration;
use partsdb_lib::model::CategoryKey;
use partsdb_lib::store::{CatalogStore, MemoryStore};
use partsdb_lib::sync::{CategoryOutcome, Reconciler, StatusBoard};
use partsdb_lib::transport::{HttpClient, HttpSource};
use serde_json::{Value, json};
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn index(resistor_hash: &str) -> Value {
    json!({
        "created": "2025-06-03T10:00:00Z",
        "categories": {
            "Resistors": {
                "Chip Resistor": {"sourcename": "chip-resistor", "datahash": resistor_hash, "stockhash": "s1"},
            },
            "Capacitors": {
                "MLCC": {"sourcename": "mlcc", "datahash": "d2", "stockhash": "s2"},
            },
        },
    })
}

fn components(description: &str, lcsc: &str) -> Value {
    json!({
        "schema": ["lcsc", "mfr", "description", "price", "attributes"],
        "components": [
            [lcsc, "ACME", description, [{"qFrom": 1, "qTo": null, "price": 0.02}], {"Package": "0603"}],
        ],
    })
}

async fn mount_json(server: &MockServer, name: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/data/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_text(server: &MockServer, name: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/data/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn publish(server: &MockServer, resistor_hash: &str) {
    mount_json(server, "index.json", index(resistor_hash)).await;
    mount_json(server, "chip-resistor.json", components("10k resistor", "C100")).await;
    mount_json(server, "chip-resistor.stock.json", json!({"C100": 500})).await;
    mount_text(server, "chip-resistor.stock.json.sha256", "s1\n").await;
    mount_json(server, "mlcc.json", components("100nF capacitor", "C200")).await;
    mount_json(server, "mlcc.stock.json", json!({"C200": 12})).await;
    mount_text(server, "mlcc.stock.json.sha256", "s2\n").await;
}

fn reconciler(server: &MockServer, store: &Arc<MemoryStore>) -> Reconciler<HttpSource> {
    let base = Url::parse(&format!("{}/data/", server.uri())).unwrap();
    let client = HttpClient::new(&base, Duration::from_secs(10), 0).unwrap();
    Reconciler::new(HttpSource::new(client, "index.json"), Arc::clone(store) as Arc<dyn CatalogStore>)
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_sync_populates_store_and_becomes_idempotent() {
    let server = MockServer::start().await;
    publish(&server, "d1").await;

    let store = Arc::new(MemoryStore::new());
    let reconciler = reconciler(&server, &store);
    assert!(reconciler.check_for_update().await.unwrap());

    let board = StatusBoard::new();
    let report = reconciler.sync(&board).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.created.as_deref(), Some("2025-06-03T10:00:00Z"));
    assert_eq!(board.status("Resistors: Chip Resistor").as_deref(), Some("Finished (new)"));

    let catalog = store.snapshot().unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.component("C100").unwrap().stock, Some(500));
    assert_eq!(catalog.component("C200").unwrap().stock, Some(12));

    let stored = store.find_category(&CategoryKey::new("Capacitors", "MLCC")).unwrap().unwrap();
    assert_eq!(stored.stock_hash, "s2");

    assert!(!reconciler.check_for_update().await.unwrap());
    let report = reconciler.sync(&StatusBoard::new()).await.unwrap();
    assert_eq!(report.changed(), 0);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_changed_category_is_recreated() {
    let first = MockServer::start().await;
    publish(&first, "d1").await;

    let store = Arc::new(MemoryStore::new());
    let _ = reconciler(&first, &store).sync(&StatusBoard::new()).await.unwrap();

    let second = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/chip-resistor.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(components("4k7 resistor", "C101")))
        .with_priority(1)
        .mount(&second)
        .await;
    publish(&second, "d1-updated").await;

    let report = reconciler(&second, &store).sync(&StatusBoard::new()).await.unwrap();
    let key = CategoryKey::new("Resistors", "Chip Resistor");
    assert!(matches!(report.outcome(&key), Some(CategoryOutcome::Recreated { components: 1, .. })));

    let catalog = store.snapshot().unwrap();
    assert!(catalog.component("C100").is_none());
    assert!(catalog.component("C101").is_some());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_index_with_wrong_content_type_fails_the_pass() {
    let server = MockServer::start().await;
    mount_text(&server, "index.json", &index("d1").to_string()).await;

    let store = Arc::new(MemoryStore::new());
    let err = reconciler(&server, &store).sync(&StatusBoard::new()).await.unwrap_err();
    assert!(format!("{err:#}").contains("not JSON"), "{err:#}");
    assert!(store.categories().unwrap().is_empty());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_missing_category_file_fails_only_that_category() {
    let server = MockServer::start().await;
    mount_json(&server, "index.json", index("d1")).await;
    mount_json(&server, "mlcc.json", components("100nF capacitor", "C200")).await;
    mount_json(&server, "mlcc.stock.json", json!({"C200": 12})).await;
    mount_text(&server, "mlcc.stock.json.sha256", "s2").await;

    let store = Arc::new(MemoryStore::new());
    let report = reconciler(&server, &store).sync(&StatusBoard::new()).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failures().count(), 1);
    assert!(matches!(
        report.outcome(&CategoryKey::new("Capacitors", "MLCC")),
        Some(CategoryOutcome::Created { .. })
    ));
    assert_eq!(store.categories().unwrap().len(), 1);
}
