// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scrapesync::application::use_cases::reconciliation::ReconciliationService;
use scrapesync::domain::models::site_status::JobState;
use scrapesync::domain::repositories::status_api::StatusApi;
use scrapesync::infrastructure::repositories::status_api_impl::HttpStatusApi;
use scrapesync::infrastructure::storage::MemoryStorage;
use scrapesync::realtime::message_router::MessageRouter;
use scrapesync::state::status_store::StatusStore;

async fn snapshot_server(body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scraping/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    server
}

fn service(server: &MockServer, store: Arc<StatusStore>) -> ReconciliationService<dyn StatusApi> {
    let api: Arc<dyn StatusApi> = Arc::new(
        HttpStatusApi::new(server.uri(), None, Arc::new(MemoryStorage::new())).unwrap(),
    );
    ReconciliationService::new(api, store)
}

#[tokio::test]
async fn test_snapshot_seeds_store_then_stream_takes_over() {
    let server = snapshot_server(json!({ "jiji": { "state": "idle" }, "kupatana": null })).await;
    let store = Arc::new(StatusStore::new());

    let report = service(&server, store.clone()).reconcile().await;

    assert!(report.is_success());
    assert_eq!(report.seeded, 1);
    assert_eq!(report.skipped_null, 1);
    assert_eq!(store.list_sites(), vec!["jiji".to_string()]);
    assert_eq!(store.get("jiji").state, JobState::Idle);
    assert!(!store.contains("kupatana"));

    let router = MessageRouter::new(store.clone());
    router.route(r#"{"type":"scraping_status","target_site":"kupatana","data":{"job_type":"listings","state":"running","total_pages":10,"pages_scraped":3}}"#);

    assert_eq!(
        store.list_sites(),
        vec!["jiji".to_string(), "kupatana".to_string()]
    );
    assert_eq!(store.view("kupatana").progress, 30);
}

#[tokio::test]
async fn test_snapshot_does_not_overwrite_streamed_status() {
    let server = snapshot_server(json!({
        "jiji": { "state": "running", "job_type": "listings", "last_update": "2025-01-01T10:00:00Z" }
    }))
    .await;
    let store = Arc::new(StatusStore::new());

    // 快照返回前事件流已给出更新的状态
    let router = MessageRouter::new(store.clone());
    router.route(r#"{"type":"scraping_status","target_site":"jiji","data":{"state":"completed","job_type":"listings","last_update":"2025-01-01T10:05:00Z"}}"#);

    let report = service(&server, store.clone()).reconcile().await;

    assert_eq!(report.seeded, 0);
    assert_eq!(report.skipped_stale, 1);
    assert_eq!(store.get("jiji").state, JobState::Completed);
}

#[tokio::test]
async fn test_snapshot_failure_is_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scraping/status"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let store = Arc::new(StatusStore::new());

    let report = service(&server, store.clone()).reconcile().await;

    assert!(!report.is_success());
    assert!(report.error.unwrap().contains("503"));
    assert!(store.list_sites().is_empty());
}

#[tokio::test]
async fn test_invalid_entry_does_not_discard_other_sites() {
    let server = snapshot_server(json!({
        "jiji": { "state": "idle" },
        "kupatana": { "state": "running", "job_type": "details", "total_pages": 4, "pages_scraped": 1 },
        "zoom": { "state": "paused" },
        "oldsite": null
    }))
    .await;
    let store = Arc::new(StatusStore::new());

    let report = service(&server, store.clone()).reconcile().await;

    assert!(report.is_success());
    assert_eq!(report.seeded, 2);
    assert_eq!(report.skipped_invalid, 1);
    assert_eq!(report.skipped_null, 1);
    assert_eq!(
        store.list_sites(),
        vec!["jiji".to_string(), "kupatana".to_string()]
    );
    assert_eq!(store.get("kupatana").state, JobState::Running);
    assert!(!store.contains("zoom"));
}
