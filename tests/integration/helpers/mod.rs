// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use scrapesync::realtime::connection_manager::StreamConfig;

/// 一次握手请求的记录
#[derive(Debug, Clone)]
pub struct Handshake {
    pub uri: String,
    pub authorization: Option<String>,
}

enum ServerFrame {
    Text(String),
    Close,
}

#[derive(Default)]
struct ServerState {
    connections: AtomicUsize,
    handshakes: Mutex<Vec<Handshake>>,
    received: Mutex<Vec<Value>>,
    current: Mutex<Option<mpsc::UnboundedSender<ServerFrame>>>,
    greeting: Mutex<Option<String>>,
}

/// 本地事件流服务器
pub struct MockStreamServer {
    pub base_url: String,
    state: Arc<ServerState>,
}

impl MockStreamServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, accept_state.clone()));
            }
        });

        Self {
            base_url: format!("http://{}/api", addr),
            state,
        }
    }

    /// 每个新连接建立后服务器发送的 `connection` 事件
    pub fn greet_with(&self, connection_id: &str) {
        *self.state.greeting.lock() = Some(
            serde_json::json!({ "type": "connection", "connection_id": connection_id })
                .to_string(),
        );
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn handshakes(&self) -> Vec<Handshake> {
        self.state.handshakes.lock().clone()
    }

    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().clone()
    }

    pub fn received_of_type(&self, kind: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|message| message["type"] == kind)
            .collect()
    }

    pub fn clear_received(&self) {
        self.state.received.lock().clear();
    }

    /// 向当前连接推送一帧文本
    pub fn push(&self, frame: impl Into<String>) {
        if let Some(tx) = self.state.current.lock().as_ref() {
            let _ = tx.send(ServerFrame::Text(frame.into()));
        }
    }

    /// 由服务器关闭当前连接
    pub fn close_current(&self) {
        if let Some(tx) = self.state.current.lock().take() {
            let _ = tx.send(ServerFrame::Close);
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            base_url: self.base_url.clone(),
            path: "/ws/scraping".to_string(),
            ping_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_millis(50),
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_attempts: None,
            channels: vec!["scraping_status".to_string()],
        }
    }
}

/// 接受 TCP 连接但从不完成 WebSocket 握手的服务器
pub struct StalledServer {
    pub base_url: String,
    accepted: Arc<AtomicUsize>,
}

impl StalledServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });

        Self {
            base_url: format!("http://{}/api", addr),
            accepted,
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            base_url: self.base_url.clone(),
            path: "/ws/scraping".to_string(),
            ping_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(3600),
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_attempts: None,
            channels: vec![],
        }
    }
}

async fn serve_connection(stream: tokio::net::TcpStream, state: Arc<ServerState>) {
    let handshake_state = state.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let authorization = request
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        handshake_state.handshakes.lock().push(Handshake {
            uri: request.uri().to_string(),
            authorization,
        });
        Ok(response)
    };

    let mut ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(_) => return,
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    *state.current.lock() = Some(tx);
    state.connections.fetch_add(1, Ordering::SeqCst);

    let greeting = state.greeting.lock().clone();
    if let Some(greeting) = greeting {
        if ws.send(Message::Text(greeting)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(&text) {
                        state.received.lock().push(value);
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            outgoing = rx.recv() => match outgoing {
                Some(ServerFrame::Text(text)) => {
                    if ws.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(ServerFrame::Close) | None => {
                    let _ = ws.close(None).await;
                    break;
                }
            },
        }
    }
}

/// 在超时前轮询直到条件成立
pub async fn wait_for<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// 带超时地等待一个 future
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("operation timed out")
}
