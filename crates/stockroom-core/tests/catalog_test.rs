#![allow(clippy::unwrap_used)]
// Integration tests for the `Catalog` facade.

use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stockroom_core::preferences::TablePatch;
use stockroom_core::{
    Catalog, CatalogConfig, ChannelState, EntityId, EntityKind, EntityRef, PreferencesLocation,
};

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

fn config(server: &MockServer) -> CatalogConfig {
    CatalogConfig::new(Url::parse(&server.uri()).unwrap())
}

#[tokio::test]
async fn test_refresh_all_loads_every_store() {
    let server = MockServer::start().await;
    for (collection, body) in [
        ("products", json!([{ "id": "p1", "name": "Widget", "brandId": "b1" }])),
        ("brands", json!([{ "id": "b1", "name": "Acme" }])),
        ("categories", json!([])),
        ("suppliers", json!([{ "id": "s1", "name": "Northwind" }])),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/api/{collection}")))
            .respond_with(ok(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let catalog = Catalog::new(config(&server)).unwrap();
    catalog.refresh_all().await.unwrap();

    assert_eq!(catalog.products().len(), 1);
    assert_eq!(catalog.brands().len(), 1);
    assert!(catalog.categories().is_empty());
    assert_eq!(catalog.suppliers().len(), 1);
}

#[tokio::test]
async fn test_label_for_prefers_cache_then_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/brands/b1"))
        .respond_with(ok(json!({ "id": "b1", "name": "Acme" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/categories/c9"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "success": false, "error": "gone" })),
        )
        .mount(&server)
        .await;

    let catalog = Catalog::new(config(&server)).unwrap();
    let brand = EntityRef::new(EntityKind::Brand, EntityId::from("b1"));

    assert_eq!(catalog.label_for(&brand).await.as_deref(), Some("Acme"));
    // Second lookup is served from the cache.
    assert_eq!(catalog.label_for(&brand).await.as_deref(), Some("Acme"));

    let missing = EntityRef::new(EntityKind::Category, EntityId::from("c9"));
    assert!(catalog.label_for(&missing).await.is_none());
}

#[tokio::test]
async fn test_preferences_persist_across_catalogs() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&server);
    cfg.preferences = PreferencesLocation::Directory(dir.path().to_path_buf());

    let first = Catalog::new(cfg.clone()).unwrap();
    first
        .preferences(EntityKind::Product)
        .set_table(TablePatch {
            page_size: Some(25),
            ..TablePatch::default()
        })
        .unwrap();
    assert!(dir.path().join("product-preferences.json").exists());

    let second = Catalog::new(cfg).unwrap();
    assert_eq!(second.preferences(EntityKind::Product).snapshot().table.page_size, 25);
    assert_eq!(second.preferences(EntityKind::Brand).snapshot().table.page_size, 10);
}

#[tokio::test]
async fn test_shutdown_closes_stores() {
    let server = MockServer::start().await;
    let catalog = Catalog::new(config(&server)).unwrap();
    assert_eq!(
        catalog.channel_state(EntityKind::Brand).await,
        ChannelState::Disconnected
    );

    catalog.shutdown().await;
    assert!(catalog.brands().is_closed());
    assert!(catalog.products().is_closed());
}
