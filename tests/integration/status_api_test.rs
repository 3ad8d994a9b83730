// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scrapesync::domain::models::command::{
    AckStatus, AutoCycleOptions, ListingsOptions,
};
use scrapesync::domain::repositories::client_storage::{ClientStorage, AUTH_TOKEN_KEY};
use scrapesync::domain::repositories::status_api::{ApiError, StatusApi};
use scrapesync::infrastructure::repositories::status_api_impl::HttpStatusApi;
use scrapesync::infrastructure::storage::MemoryStorage;

async fn api_for(server: &MockServer, token: Option<&str>) -> HttpStatusApi {
    let storage = Arc::new(MemoryStorage::new());
    if let Some(token) = token {
        storage.set(AUTH_TOKEN_KEY, token).unwrap();
    }
    HttpStatusApi::new(format!("{}/api/", server.uri()), None, storage).unwrap()
}

#[tokio::test]
async fn test_fetch_snapshot_with_null_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/scraping/status"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jiji": { "state": "idle" },
            "kupatana": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = api_for(&server, Some("tok")).await.fetch_snapshot().await.unwrap();

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot["jiji"].as_ref().unwrap()["state"], "idle");
    assert!(snapshot["kupatana"].is_none());
}

#[tokio::test]
async fn test_command_body_carries_site_and_options() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/scraping/auto-cycle/start"))
        .and(body_json(json!({
            "target_site": "jiji",
            "max_pages": 5,
            "wait_minutes": 30
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "started",
            "message": "auto-cycle started",
            "cycle_number": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = AutoCycleOptions {
        max_pages: Some(5),
        batch_size: None,
        wait_minutes: Some(30),
    };
    let ack = api_for(&server, None)
        .await
        .start_auto_cycle("jiji", &options)
        .await
        .unwrap();

    assert_eq!(ack.status, AckStatus::Started);
    assert_eq!(ack.message.as_deref(), Some("auto-cycle started"));
    assert_eq!(ack.extra["cycle_number"], 1);
}

#[tokio::test]
async fn test_stop_sends_only_target_site() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/scraping/stop"))
        .and(body_json(json!({ "target_site": "kupatana" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "stopped" })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = api_for(&server, None).await.stop("kupatana").await.unwrap();
    assert_eq!(ack.status, AckStatus::Stopped);
}

#[tokio::test]
async fn test_error_status_and_bad_body_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/scraping/listings/start"))
        .respond_with(ResponseTemplate::new(409).set_body_string("already running"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/scraping/details/start"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let api = api_for(&server, None).await;

    let err = api
        .start_listings("jiji", &ListingsOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::Status { status: 409, ref body } if body == "already running"
    ));

    let err = api
        .start_details("jiji", &Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}
