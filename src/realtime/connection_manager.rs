// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::future::pending;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{spawn_blocking, JoinHandle};
use tokio::time::{interval_at, sleep_until, timeout, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use crate::config::settings::{ApiSettings, StreamSettings};
use crate::domain::models::connection::{ConnectionInfo, ConnectionStatus};
use crate::domain::models::event::OutboundEvent;
use crate::domain::repositories::client_storage::{
    ClientStorage, AUTH_TOKEN_KEY, CONNECTION_ID_KEY,
};
use crate::infrastructure::metrics::{CONNECTION_STATUS, RECONNECTS};
use crate::realtime::message_router::{MessageRouter, RouteOutcome};
use crate::realtime::stream_url::derive_stream_url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 连接错误类型
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// 事件流地址无效
    #[error("Invalid stream URL: {0}")]
    InvalidUrl(String),
    /// 握手请求无法构造
    #[error("Invalid handshake request: {0}")]
    InvalidRequest(String),
    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(String),
    /// 握手在限定时间内未完成
    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),
    /// 连接尝试被断开、重连或关闭请求取消
    #[error("Connection attempt cancelled")]
    Aborted,
    /// 连接管理器已关闭
    #[error("Connection manager is not running")]
    NotRunning,
}

impl ConnectionError {
    /// 暂时性失败，驱动任务会在后台继续重试或已按调用方要求放弃
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectionError::Transport(_) | ConnectionError::Timeout(_) | ConnectionError::Aborted
        )
    }
}

/// 事件流连接配置
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// REST 基础URL
    pub base_url: String,
    /// 事件流固定路径
    pub path: String,
    /// 心跳间隔
    pub ping_interval: Duration,
    /// 握手超时
    pub connect_timeout: Duration,
    /// 意外断开后的重连间隔
    pub reconnect_interval: Duration,
    /// 主动重连的延迟
    pub reconnect_delay: Duration,
    /// 连续重连次数上限
    pub max_reconnect_attempts: Option<u32>,
    /// 连接后订阅的频道
    pub channels: Vec<String>,
}

impl StreamConfig {
    pub fn from_settings(api: &ApiSettings, stream: &StreamSettings) -> Self {
        Self {
            base_url: api.base_url.clone(),
            path: stream.path.clone(),
            ping_interval: stream.ping_interval(),
            connect_timeout: stream.connect_timeout(),
            reconnect_interval: stream.reconnect_interval(),
            reconnect_delay: stream.reconnect_delay(),
            max_reconnect_attempts: stream.max_reconnect_attempts,
            channels: stream.channels.clone(),
        }
    }
}

/// 连接统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStats {
    /// 已发送的心跳数
    pub pings_sent: u64,
    /// 当前活动的心跳定时器数量
    pub keepalive_timers: usize,
    /// 成功建立连接的次数
    pub successful_connects: u64,
}

#[derive(Debug, Default)]
struct SharedStats {
    pings_sent: AtomicU64,
    keepalive_timers: AtomicUsize,
    successful_connects: AtomicU64,
}

enum Command {
    Connect(oneshot::Sender<Result<(), ConnectionError>>),
    Disconnect(oneshot::Sender<()>),
    Reconnect(oneshot::Sender<()>),
    Send(OutboundEvent, oneshot::Sender<bool>),
    Shutdown(oneshot::Sender<()>),
}

/// 连接管理器
///
/// 持有到事件源的唯一持久连接。连接、心跳定时器和重连定时器都由一个驱动任务独占，
/// 句柄通过命令通道与其通信，因此替换或清空定时器字段即是取消，
/// 不会遗留作用于旧连接的定时器。
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    info: watch::Receiver<ConnectionInfo>,
    stats: Arc<SharedStats>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// 在当前 tokio 运行时上启动连接管理器，初始状态为已断开
    ///
    /// # 参数
    ///
    /// * `config` - 事件流配置
    /// * `storage` - 保存认证令牌和连接ID的客户端存储
    /// * `router` - 入站帧的路由器
    pub fn spawn(
        config: StreamConfig,
        storage: Arc<dyn ClientStorage>,
        router: Arc<MessageRouter>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (info_tx, info) = watch::channel(ConnectionInfo {
            connection_id: storage.get(CONNECTION_ID_KEY),
            ..ConnectionInfo::default()
        });
        let stats = Arc::new(SharedStats::default());

        let driver = Driver {
            config,
            storage,
            router,
            commands: command_rx,
            info_tx,
            stats: stats.clone(),
            socket: None,
            keepalive: None,
            reconnect_at: None,
            attempts: 0,
            waiting: Vec::new(),
            closed: false,
        };
        let handle = tokio::spawn(driver.run());

        Self {
            commands,
            info,
            stats,
            driver: Mutex::new(Some(handle)),
        }
    }

    /// 建立连接；已连接时不做任何事
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.request(Command::Connect(tx))?;
        rx.await.map_err(|_| ConnectionError::NotRunning)?
    }

    /// 主动断开，取消待执行的重连和进行中的握手并停止心跳
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.request(Command::Disconnect(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// 断开后在短暂延迟后重新连接，保留连接ID
    pub async fn reconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.request(Command::Reconnect(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// 发送出站事件；未连接时丢弃并返回 `false`
    pub async fn send_message(&self, event: OutboundEvent) -> bool {
        let kind = event.kind();
        let (tx, rx) = oneshot::channel();
        if self.request(Command::Send(event, tx)).is_err() {
            warn!("Dropping outbound {} event: connection manager stopped", kind);
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// 关闭连接并停止驱动任务
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.request(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Connection driver terminated abnormally: {}", e);
            }
        }
    }

    /// 当前连接信息
    pub fn info(&self) -> ConnectionInfo {
        self.info.borrow().clone()
    }

    /// 当前连接状态
    pub fn status(&self) -> ConnectionStatus {
        self.info.borrow().status
    }

    /// 订阅连接信息变更
    pub fn watch(&self) -> watch::Receiver<ConnectionInfo> {
        self.info.clone()
    }

    /// 连接统计信息
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            pings_sent: self.stats.pings_sent.load(Ordering::Relaxed),
            keepalive_timers: self.stats.keepalive_timers.load(Ordering::Relaxed),
            successful_connects: self.stats.successful_connects.load(Ordering::Relaxed),
        }
    }

    fn request(&self, command: Command) -> Result<(), ConnectionError> {
        self.commands
            .send(command)
            .map_err(|_| ConnectionError::NotRunning)
    }
}

/// 驱动任务，独占连接和所有定时器
struct Driver {
    config: StreamConfig,
    storage: Arc<dyn ClientStorage>,
    router: Arc<MessageRouter>,
    commands: mpsc::UnboundedReceiver<Command>,
    info_tx: watch::Sender<ConnectionInfo>,
    stats: Arc<SharedStats>,
    socket: Option<WsStream>,
    keepalive: Option<Interval>,
    reconnect_at: Option<Instant>,
    attempts: u32,
    /// 握手期间到达的连接请求，与当前尝试共享结果
    waiting: Vec<oneshot::Sender<Result<(), ConnectionError>>>,
    closed: bool,
}

impl Driver {
    async fn run(mut self) {
        debug!("Connection driver started");
        while !self.closed {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        self.teardown().await;
                        self.closed = true;
                        let _ = reply.send(());
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.teardown().await;
                        self.closed = true;
                    }
                },
                frame = next_frame(&mut self.socket), if self.socket.is_some() => {
                    self.handle_frame(frame).await;
                }
                _ = tick(&mut self.keepalive), if self.keepalive.is_some() => {
                    self.send_ping().await;
                }
                _ = sleep_until_deadline(self.reconnect_at), if self.reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    info!("Reconnecting to status stream (attempt {})", self.attempts);
                    let _ = self.connect().await;
                }
            }
        }
        debug!("Connection driver stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => {
                // 显式连接重置重连计数
                self.attempts = 0;
                self.publish_attempts();
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            Command::Disconnect(reply) => {
                self.teardown().await;
                info!("Disconnected from status stream");
                let _ = reply.send(());
            }
            Command::Reconnect(reply) => {
                self.teardown().await;
                self.reconnect_at = Some(Instant::now() + self.config.reconnect_delay);
                info!(
                    "Reconnect scheduled in {:?}",
                    self.config.reconnect_delay
                );
                let _ = reply.send(());
            }
            Command::Send(event, reply) => {
                let sent = self.write(&event).await;
                let _ = reply.send(sent);
            }
            Command::Shutdown(reply) => {
                self.teardown().await;
                self.closed = true;
                let _ = reply.send(());
            }
        }
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        let result = self.establish().await;
        for waiter in self.waiting.drain(..) {
            let _ = waiter.send(result.clone());
        }
        result
    }

    /// 握手与命令通道竞争，断开、重连和关闭请求不必等待握手结束
    async fn establish(&mut self) -> Result<(), ConnectionError> {
        if self.socket.is_some() {
            trace!("Already connected, ignoring connect request");
            return Ok(());
        }
        self.reconnect_at = None;
        self.set_status(ConnectionStatus::Connecting);

        let connection_id = self.storage.get(CONNECTION_ID_KEY);
        let request = match self.handshake_request(connection_id.as_deref()) {
            Ok(request) => request,
            Err(e) => {
                error!("Cannot build status stream request: {}", e);
                self.set_status(ConnectionStatus::Error);
                return Err(e);
            }
        };

        debug!("Connecting to status stream at {}", request.uri());
        let limit = self.config.connect_timeout;
        let handshake = timeout(limit, connect_async(request));
        tokio::pin!(handshake);

        let outcome = loop {
            tokio::select! {
                outcome = &mut handshake => break outcome,
                command = self.commands.recv() => {
                    if let Some(aborted) = self.interrupt(command).await {
                        return Err(aborted);
                    }
                }
            }
        };

        match outcome {
            Err(_elapsed) => {
                warn!("Status stream handshake timed out after {:?}", limit);
                self.set_status(ConnectionStatus::Error);
                self.schedule_reconnect();
                Err(ConnectionError::Timeout(limit))
            }
            Ok(Ok((socket, _response))) => {
                self.socket = Some(socket);
                self.attempts = 0;
                self.publish_attempts();
                self.arm_keepalive();
                self.stats.successful_connects.fetch_add(1, Ordering::Relaxed);
                self.set_status(ConnectionStatus::Connected);
                info!("Connected to status stream");

                for channel in self.config.channels.clone() {
                    self.write(&OutboundEvent::subscribe(channel)).await;
                }
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Failed to connect to status stream: {}", e);
                self.set_status(ConnectionStatus::Error);
                self.schedule_reconnect();
                Err(ConnectionError::Transport(e.to_string()))
            }
        }
    }

    /// 处理握手期间到达的命令，返回 `Some` 表示放弃本次握手
    async fn interrupt(&mut self, command: Option<Command>) -> Option<ConnectionError> {
        match command {
            Some(Command::Connect(reply)) => {
                self.waiting.push(reply);
                None
            }
            Some(Command::Send(event, reply)) => {
                warn!("Handshake in progress, dropping outbound {} event", event.kind());
                let _ = reply.send(false);
                None
            }
            Some(Command::Disconnect(reply)) => {
                self.teardown().await;
                info!("Connection attempt cancelled by disconnect");
                let _ = reply.send(());
                Some(ConnectionError::Aborted)
            }
            Some(Command::Reconnect(reply)) => {
                self.teardown().await;
                self.reconnect_at = Some(Instant::now() + self.config.reconnect_delay);
                info!("Connection attempt restarted by reconnect request");
                let _ = reply.send(());
                Some(ConnectionError::Aborted)
            }
            Some(Command::Shutdown(reply)) => {
                self.teardown().await;
                self.closed = true;
                let _ = reply.send(());
                Some(ConnectionError::Aborted)
            }
            None => {
                self.teardown().await;
                self.closed = true;
                Some(ConnectionError::Aborted)
            }
        }
    }

    fn handshake_request(
        &self,
        connection_id: Option<&str>,
    ) -> Result<
        tokio_tungstenite::tungstenite::handshake::client::Request,
        ConnectionError,
    > {
        let url = derive_stream_url(&self.config.base_url, &self.config.path, connection_id)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectionError::InvalidRequest(e.to_string()))?;

        if let Some(token) = self.storage.get(AUTH_TOKEN_KEY) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ConnectionError::InvalidRequest(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }

    async fn handle_frame(
        &mut self,
        frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) {
        match frame {
            Some(Ok(Message::Text(text))) => {
                if let RouteOutcome::ConnectionAssigned(id) = self.router.route(&text) {
                    self.adopt_connection_id(id).await;
                }
            }
            Some(Ok(Message::Binary(bytes))) => {
                if let RouteOutcome::ConnectionAssigned(id) = self.router.route_binary(&bytes) {
                    self.adopt_connection_id(id).await;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                info!("Status stream closed by server: {:?}", frame);
                self.handle_closed(ConnectionStatus::Disconnected);
            }
            Some(Ok(_)) => trace!("Ignoring control frame"),
            Some(Err(e)) => {
                warn!("Status stream error: {}", e);
                self.handle_closed(ConnectionStatus::Error);
            }
            None => {
                info!("Status stream ended");
                self.handle_closed(ConnectionStatus::Disconnected);
            }
        }
    }

    /// 意外关闭：清理连接和心跳，按策略安排重连
    fn handle_closed(&mut self, status: ConnectionStatus) {
        self.socket = None;
        self.disarm_keepalive();
        self.set_status(status);
        self.schedule_reconnect();
    }

    /// 存储可能落盘，写入放到阻塞线程池
    async fn adopt_connection_id(&mut self, id: String) {
        if self.storage.get(CONNECTION_ID_KEY).as_deref() != Some(id.as_str()) {
            let storage = self.storage.clone();
            let value = id.clone();
            match spawn_blocking(move || storage.set(CONNECTION_ID_KEY, &value)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to persist connection id: {}", e),
                Err(e) => warn!("Connection id persistence task failed: {}", e),
            }
        }
        info!("Using connection id {}", id);
        self.info_tx.send_modify(|info| info.connection_id = Some(id));
    }

    async fn send_ping(&mut self) {
        if self.write(&OutboundEvent::ping()).await {
            self.stats.pings_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn write(&mut self, event: &OutboundEvent) -> bool {
        let Some(socket) = self.socket.as_mut() else {
            warn!("Not connected, dropping outbound {} event", event.kind());
            return false;
        };
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize {} event: {}", event.kind(), e);
                return false;
            }
        };
        match socket.send(Message::Text(payload)).await {
            Ok(()) => {
                trace!("Sent {} event", event.kind());
                true
            }
            Err(e) => {
                warn!("Failed to send {} event: {}", event.kind(), e);
                self.handle_closed(ConnectionStatus::Error);
                false
            }
        }
    }

    /// 主动关闭：不触发自动重连
    async fn teardown(&mut self) {
        self.reconnect_at = None;
        self.disarm_keepalive();
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                debug!("Error while closing status stream: {}", e);
            }
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn schedule_reconnect(&mut self) {
        if let Some(max) = self.config.max_reconnect_attempts {
            if self.attempts >= max {
                warn!(
                    "Giving up on status stream after {} reconnect attempts",
                    self.attempts
                );
                self.set_status(ConnectionStatus::Error);
                return;
            }
        }
        self.attempts += 1;
        self.publish_attempts();
        counter!(RECONNECTS).increment(1);
        self.reconnect_at = Some(Instant::now() + self.config.reconnect_interval);
        debug!(
            "Reconnect attempt {} scheduled in {:?}",
            self.attempts, self.config.reconnect_interval
        );
    }

    /// 替换心跳定时器，任何时刻最多一个
    fn arm_keepalive(&mut self) {
        let period = self.config.ping_interval;
        if period.is_zero() {
            warn!("Ping interval is zero, keepalive disabled");
            self.disarm_keepalive();
            return;
        }
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.keepalive = Some(interval);
        self.stats.keepalive_timers.store(1, Ordering::Relaxed);
    }

    fn disarm_keepalive(&mut self) {
        self.keepalive = None;
        self.stats.keepalive_timers.store(0, Ordering::Relaxed);
    }

    fn set_status(&self, status: ConnectionStatus) {
        gauge!(CONNECTION_STATUS).set(status.as_gauge());
        self.info_tx.send_if_modified(|info| {
            if info.status == status {
                false
            } else {
                debug!("Connection status {} -> {}", info.status, status);
                info.status = status;
                true
            }
        });
    }

    fn publish_attempts(&self) {
        let attempts = self.attempts;
        self.info_tx
            .send_if_modified(|info| std::mem::replace(&mut info.reconnect_attempts, attempts) != attempts);
    }
}

async fn next_frame(
    socket: &mut Option<WsStream>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match socket {
        Some(socket) => socket.next().await,
        None => pending().await,
    }
}

async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
