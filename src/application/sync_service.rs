// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::application::use_cases::command_dispatcher::CommandDispatcher;
use crate::application::use_cases::reconciliation::{ReconcileReport, ReconciliationService};
use crate::config::settings::Settings;
use crate::domain::repositories::client_storage::ClientStorage;
use crate::domain::repositories::status_api::StatusApi;
use crate::infrastructure::repositories::status_api_impl::HttpStatusApi;
use crate::infrastructure::storage;
use crate::realtime::connection_manager::{ConnectionManager, StreamConfig};
use crate::realtime::message_router::MessageRouter;
use crate::state::status_store::StatusStore;
use crate::utils::errors::SyncError;

/// 抓取状态同步服务
///
/// 显式构造的单例：持有唯一的事件流连接、状态存储和命令用例，
/// 由 `start()` / `stop()` 管理生命周期。测试可以创建互相独立的实例。
pub struct StatusSyncService {
    store: Arc<StatusStore>,
    router: Arc<MessageRouter>,
    connection: ConnectionManager,
    reconciliation: ReconciliationService<dyn StatusApi>,
    dispatcher: CommandDispatcher<dyn StatusApi>,
    started: AtomicBool,
}

impl StatusSyncService {
    /// 根据配置创建服务，必须在 tokio 运行时中调用
    pub fn from_settings(settings: &Settings) -> Result<Self, SyncError> {
        let storage = storage::from_settings(&settings.storage)?;
        let api: Arc<dyn StatusApi> = Arc::new(HttpStatusApi::new(
            settings.api.base_url.clone(),
            settings.api.request_timeout(),
            storage.clone(),
        )?);
        let config = StreamConfig::from_settings(&settings.api, &settings.stream);
        Ok(Self::new(config, storage, api))
    }

    /// 用给定的依赖创建服务，必须在 tokio 运行时中调用
    ///
    /// # 参数
    ///
    /// * `config` - 事件流配置
    /// * `storage` - 客户端持久存储
    /// * `api` - 抓取状态 REST 接口
    pub fn new(
        config: StreamConfig,
        storage: Arc<dyn ClientStorage>,
        api: Arc<dyn StatusApi>,
    ) -> Self {
        let store = Arc::new(StatusStore::new());
        let router = Arc::new(MessageRouter::new(store.clone()));
        let connection = ConnectionManager::spawn(config, storage, router.clone());

        Self {
            reconciliation: ReconciliationService::new(api.clone(), store.clone()),
            dispatcher: CommandDispatcher::new(api, store.clone()),
            store,
            router,
            connection,
            started: AtomicBool::new(false),
        }
    }

    /// 启动同步：快照对账与事件流连接并发进行
    ///
    /// 快照失败和暂时连不上事件流都不是致命错误；只有事件流地址无效时返回错误。
    pub async fn start(&self) -> Result<ReconcileReport, SyncError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyStarted);
        }
        info!("Starting status sync");

        let (report, connected) =
            tokio::join!(self.reconciliation.reconcile(), self.connection.connect());

        match connected {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                warn!("Status stream unavailable, retrying in background: {}", e);
            }
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        }
        Ok(report)
    }

    /// 停止同步：主动断开事件流，存储保留最后的状态
    pub async fn stop(&self) -> Result<(), SyncError> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Err(SyncError::NotStarted);
        }
        self.connection.disconnect().await;
        info!("Status sync stopped");
        Ok(())
    }

    /// 断开并停止连接驱动任务，之后服务不可再启动
    pub async fn shutdown(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.connection.shutdown().await;
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<dyn StatusApi> {
        &self.dispatcher
    }

    /// 重新执行一次快照对账
    pub async fn reconcile(&self) -> ReconcileReport {
        self.reconciliation.reconcile().await
    }
}
