// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;

use super::helpers::{wait_for, within, MockStreamServer, StalledServer};
use scrapesync::domain::models::connection::ConnectionStatus;
use scrapesync::domain::models::event::OutboundEvent;
use scrapesync::domain::models::site_status::JobState;
use scrapesync::domain::repositories::client_storage::{
    ClientStorage, AUTH_TOKEN_KEY, CONNECTION_ID_KEY,
};
use scrapesync::infrastructure::storage::{FileStorage, MemoryStorage};
use scrapesync::realtime::connection_manager::{
    ConnectionError, ConnectionManager, StreamConfig,
};
use scrapesync::realtime::message_router::MessageRouter;
use scrapesync::state::status_store::StatusStore;

struct Harness {
    manager: ConnectionManager,
    store: Arc<StatusStore>,
    storage: Arc<MemoryStorage>,
}

fn harness(config: StreamConfig, storage: Arc<MemoryStorage>) -> Harness {
    let store = Arc::new(StatusStore::new());
    let router = Arc::new(MessageRouter::new(store.clone()));
    let manager = ConnectionManager::spawn(config, storage.clone(), router);
    Harness {
        manager,
        store,
        storage,
    }
}

#[tokio::test]
async fn test_connect_subscribes_and_sends_credentials() {
    let server = MockStreamServer::start().await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(AUTH_TOKEN_KEY, "secret-token").unwrap();
    storage.set(CONNECTION_ID_KEY, "previous").unwrap();
    let h = harness(server.stream_config(), storage);

    within(h.manager.connect()).await.unwrap();
    assert_eq!(h.manager.status(), ConnectionStatus::Connected);

    wait_for("subscribe", || !server.received_of_type("subscribe").is_empty()).await;
    assert_eq!(
        server.received_of_type("subscribe")[0]["channel"],
        "scraping_status"
    );

    let handshake = &server.handshakes()[0];
    assert_eq!(handshake.uri, "/api/ws/scraping?connection_id=previous");
    assert_eq!(
        handshake.authorization.as_deref(),
        Some("Bearer secret-token")
    );

    // 已连接时再次连接不会建立新连接
    within(h.manager.connect()).await.unwrap();
    assert_eq!(server.connections(), 1);

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_server_assigned_connection_id_is_persisted_and_reused() {
    let server = MockStreamServer::start().await;
    server.greet_with("srv-1");
    let h = harness(server.stream_config(), Arc::new(MemoryStorage::new()));

    within(h.manager.connect()).await.unwrap();
    wait_for("connection id", || {
        h.manager.info().connection_id.as_deref() == Some("srv-1")
    })
    .await;
    assert_eq!(h.storage.get(CONNECTION_ID_KEY).as_deref(), Some("srv-1"));
    assert_eq!(server.handshakes()[0].uri, "/api/ws/scraping");

    within(h.manager.reconnect()).await;
    wait_for("second connection", || server.connections() == 2).await;
    assert_eq!(
        server.handshakes()[1].uri,
        "/api/ws/scraping?connection_id=srv-1"
    );

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_status_events_reach_the_store() {
    let server = MockStreamServer::start().await;
    let h = harness(server.stream_config(), Arc::new(MemoryStorage::new()));
    within(h.manager.connect()).await.unwrap();
    wait_for("server side connection", || server.connections() == 1).await;

    server.push("definitely not json");
    server.push(r#"{"type":"scraping_status","target_site":"kupatana","data":{"job_type":"listings","state":"running","total_pages":10,"pages_scraped":3}}"#);

    wait_for("status event", || h.store.contains("kupatana")).await;
    let view = h.store.view("kupatana");
    assert_eq!(view.status.state, JobState::Running);
    assert_eq!(view.progress, 30);
    assert_eq!(h.manager.status(), ConnectionStatus::Connected);

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_unexpected_close_triggers_reconnect() {
    let server = MockStreamServer::start().await;
    let h = harness(server.stream_config(), Arc::new(MemoryStorage::new()));
    within(h.manager.connect()).await.unwrap();
    wait_for("server side connection", || server.connections() == 1).await;

    server.close_current();

    wait_for("reconnect", || server.connections() == 2).await;
    wait_for("connected again", || {
        h.manager.status() == ConnectionStatus::Connected
    })
    .await;
    assert_eq!(h.manager.info().reconnect_attempts, 0);
    assert_eq!(h.manager.stats().successful_connects, 2);

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_suppresses_auto_reconnect() {
    let server = MockStreamServer::start().await;
    let h = harness(server.stream_config(), Arc::new(MemoryStorage::new()));
    within(h.manager.connect()).await.unwrap();
    wait_for("server side connection", || server.connections() == 1).await;

    within(h.manager.disconnect()).await;
    assert_eq!(h.manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(h.manager.stats().keepalive_timers, 0);

    // Several reconnect intervals
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connections(), 1);
    assert_eq!(h.manager.status(), ConnectionStatus::Disconnected);
    assert!(!h.manager.send_message(OutboundEvent::ping()).await);

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_single_keepalive_timer_after_repeated_reconnects() {
    let server = MockStreamServer::start().await;
    let mut config = server.stream_config();
    config.ping_interval = Duration::from_millis(100);
    config.channels.clear();
    let h = harness(config, Arc::new(MemoryStorage::new()));

    within(h.manager.connect()).await.unwrap();
    for n in 2..=6 {
        within(h.manager.reconnect()).await;
        wait_for("reconnect", || server.connections() == n).await;
        wait_for("connected", || {
            h.manager.status() == ConnectionStatus::Connected
        })
        .await;
    }
    assert_eq!(h.manager.stats().keepalive_timers, 1);

    server.clear_received();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    let pings = server.received_of_type("ping").len();

    // One timer yields about ten pings per second; six would yield about sixty
    assert!(
        (5..=15).contains(&pings),
        "expected a single keepalive timer, saw {} pings",
        pings
    );

    h.manager.shutdown().await;
}

#[tokio::test]
async fn test_send_message_while_connected() {
    let server = MockStreamServer::start().await;
    let mut config = server.stream_config();
    config.channels.clear();
    let h = harness(config, Arc::new(MemoryStorage::new()));
    within(h.manager.connect()).await.unwrap();

    assert!(h.manager.send_message(OutboundEvent::subscribe("alerts")).await);
    wait_for("subscribe", || !server.received_of_type("subscribe").is_empty()).await;
    assert_eq!(server.received_of_type("subscribe")[0]["channel"], "alerts");

    h.manager.shutdown().await;
    assert_eq!(h.manager.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_disconnect_interrupts_stalled_handshake() {
    let server = StalledServer::start().await;
    let h = harness(server.stream_config(), Arc::new(MemoryStorage::new()));
    let manager = Arc::new(h.manager);

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.connect().await })
    };
    wait_for("tcp accept", || server.accepted() == 1).await;
    assert_eq!(manager.status(), ConnectionStatus::Connecting);

    within(manager.disconnect()).await;
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    let result = within(pending).await.unwrap();
    assert!(matches!(result, Err(ConnectionError::Aborted)));

    // Nothing was scheduled behind the cancelled attempt
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.accepted(), 1);
    assert_eq!(manager.info().reconnect_attempts, 0);

    within(manager.shutdown()).await;
}

#[tokio::test]
async fn test_shutdown_interrupts_stalled_handshake() {
    let server = StalledServer::start().await;
    let h = harness(server.stream_config(), Arc::new(MemoryStorage::new()));
    let manager = Arc::new(h.manager);

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.connect().await })
    };
    wait_for("tcp accept", || server.accepted() == 1).await;

    within(manager.shutdown()).await;
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert!(matches!(
        within(pending).await.unwrap(),
        Err(ConnectionError::Aborted)
    ));
    assert!(matches!(
        manager.connect().await,
        Err(ConnectionError::NotRunning)
    ));
}

#[tokio::test]
async fn test_stalled_handshake_times_out_and_schedules_retry() {
    let server = StalledServer::start().await;
    let mut config = server.stream_config();
    config.connect_timeout = Duration::from_millis(200);
    let h = harness(config, Arc::new(MemoryStorage::new()));

    let result = within(h.manager.connect()).await;
    assert!(matches!(result, Err(ConnectionError::Timeout(_))));
    let info = h.manager.info();
    assert_eq!(info.status, ConnectionStatus::Error);
    assert_eq!(info.reconnect_attempts, 1);

    within(h.manager.shutdown()).await;
}

#[tokio::test]
async fn test_connection_id_is_written_to_file_storage() {
    let server = MockStreamServer::start().await;
    server.greet_with("srv-file");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("client_storage.json");
    let storage: Arc<dyn ClientStorage> = Arc::new(FileStorage::open(&path).unwrap());
    let router = Arc::new(MessageRouter::new(Arc::new(StatusStore::new())));
    let manager = ConnectionManager::spawn(server.stream_config(), storage, router);

    within(manager.connect()).await.unwrap();
    wait_for("connection id", || {
        manager.info().connection_id.as_deref() == Some("srv-file")
    })
    .await;

    // The id is on disk by the time it is published
    let reopened = FileStorage::open(&path).unwrap();
    assert_eq!(reopened.get(CONNECTION_ID_KEY).as_deref(), Some("srv-file"));

    // Frames keep flowing after the write
    server.push(r#"{"type":"scraping_status","target_site":"jiji","data":{"state":"running"}}"#);
    within(manager.send_message(OutboundEvent::ping())).await;
    manager.shutdown().await;
}

#[tokio::test]
async fn test_zero_ping_interval_connects_without_keepalive() {
    let server = MockStreamServer::start().await;
    let mut config = server.stream_config();
    config.ping_interval = Duration::ZERO;
    let h = harness(config, Arc::new(MemoryStorage::new()));

    within(h.manager.connect()).await.unwrap();
    assert_eq!(h.manager.status(), ConnectionStatus::Connected);
    assert_eq!(h.manager.stats().keepalive_timers, 0);

    h.manager.shutdown().await;
}
