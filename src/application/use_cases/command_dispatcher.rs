// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::models::command::{
    AckStatus, AutoCycleOptions, CommandAck, CommandKind, DetailsOptions, ListingsOptions,
    StartKind,
};
use crate::domain::repositories::status_api::{ApiError, StatusApi};
use crate::infrastructure::metrics::COMMANDS;
use crate::state::status_store::{ControlRejection, StartTicket, StatusStore};

/// 命令错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// 本地前置条件不满足，请求未发出
    #[error("{command} for {site} rejected: {reason}")]
    Rejected {
        site: String,
        command: CommandKind,
        reason: ControlRejection,
    },
    /// REST 调用失败，本地状态已回滚
    #[error("{command} for {site} failed: {message}")]
    Failed {
        site: String,
        command: CommandKind,
        message: String,
    },
}

impl CommandError {
    pub fn site(&self) -> &str {
        match self {
            CommandError::Rejected { site, .. } | CommandError::Failed { site, .. } => site,
        }
    }

    pub fn command(&self) -> CommandKind {
        match self {
            CommandError::Rejected { command, .. } | CommandError::Failed { command, .. } => {
                *command
            }
        }
    }
}

/// 作业控制命令用例
///
/// 通过 REST 发出启动和停止命令，先在本地登记乐观状态，失败时回滚。
/// 不同站点的命令可以并发；同一站点的启动和停止由存储的控制标志串行化。
pub struct CommandDispatcher<A: ?Sized> {
    api: Arc<A>,
    store: Arc<StatusStore>,
}

impl<A> CommandDispatcher<A>
where
    A: StatusApi + ?Sized,
{
    pub fn new(api: Arc<A>, store: Arc<StatusStore>) -> Self {
        Self { api, store }
    }

    /// 启动列表抓取
    pub async fn start_listings_scrape(
        &self,
        site: &str,
        options: &ListingsOptions,
    ) -> Result<CommandAck, CommandError> {
        let pending = self.begin_start(site, StartKind::Listings)?;
        let result = self.api.start_listings(site, options).await;
        self.finish_start(pending, site, StartKind::Listings, result)
    }

    /// 启动详情抓取
    pub async fn start_details_scrape(
        &self,
        site: &str,
        options: &DetailsOptions,
    ) -> Result<CommandAck, CommandError> {
        let pending = self.begin_start(site, StartKind::Details)?;
        let result = self.api.start_details(site, options).await;
        self.finish_start(pending, site, StartKind::Details, result)
    }

    /// 启动自动循环
    pub async fn start_auto_cycle(
        &self,
        site: &str,
        options: &AutoCycleOptions,
    ) -> Result<CommandAck, CommandError> {
        let pending = self.begin_start(site, StartKind::AutoCycle)?;
        let result = self.api.start_auto_cycle(site, options).await;
        self.finish_start(pending, site, StartKind::AutoCycle, result)
    }

    /// 停止站点上的作业
    ///
    /// 站点在事件流确认前不会被视为空闲，期间重复的停止请求会被拒绝。
    /// 调用方放弃等待时停止标志会被清除。
    pub async fn stop(&self, site: &str) -> Result<CommandAck, CommandError> {
        let command = CommandKind::Stop;
        if let Err(reason) = self.store.begin_stop(site) {
            return Err(self.rejected(site, command, reason));
        }
        let pending = PendingStop {
            store: &self.store,
            site,
            armed: true,
        };

        let result = self.api.stop(site).await;
        pending.disarm();
        match result {
            Ok(ack) => {
                if ack.status == AckStatus::Stopped {
                    self.store.stop_completed_locally(site);
                } else {
                    self.store.stop_acknowledged(site);
                }
                record(command, "ok");
                info!("Stop requested for {}: {:?}", site, ack.status);
                Ok(ack)
            }
            Err(e) => {
                self.store.rollback_stop(site);
                Err(failed(site, command, e))
            }
        }
    }

    fn begin_start(&self, site: &str, kind: StartKind) -> Result<PendingStart<'_>, CommandError> {
        let ticket = self
            .store
            .begin_start(site, kind)
            .map_err(|reason| self.rejected(site, kind.command(), reason))?;
        Ok(PendingStart {
            store: &self.store,
            ticket: Some(ticket),
        })
    }

    fn finish_start(
        &self,
        pending: PendingStart<'_>,
        site: &str,
        kind: StartKind,
        result: Result<CommandAck, ApiError>,
    ) -> Result<CommandAck, CommandError> {
        let command = kind.command();
        match result {
            Ok(ack) => {
                match ack.status {
                    AckStatus::Started => pending.resolve(StatusStore::confirm_started),
                    AckStatus::Completed => pending.resolve(StatusStore::complete_locally),
                    AckStatus::Stopped => {
                        // Nothing is running, keep the pre-command flags
                        debug!("{} for {} acknowledged as stopped", command, site);
                        pending.resolve(StatusStore::rollback_start);
                    }
                }
                record(command, "ok");
                info!("{} for {}: {:?}", command, site, ack.status);
                Ok(ack)
            }
            Err(e) => {
                pending.resolve(StatusStore::rollback_start);
                Err(failed(site, command, e))
            }
        }
    }

    fn rejected(&self, site: &str, command: CommandKind, reason: ControlRejection) -> CommandError {
        record(command, "rejected");
        debug!("{} for {} rejected: {}", command, site, reason);
        CommandError::Rejected {
            site: site.to_string(),
            command,
            reason,
        }
    }
}

/// 在途的启动请求
///
/// 未被显式处理就被丢弃（调用方取消或超时）时回滚到请求前的控制标志。
struct PendingStart<'a> {
    store: &'a StatusStore,
    ticket: Option<StartTicket>,
}

impl PendingStart<'_> {
    fn resolve(mut self, apply: impl FnOnce(&StatusStore, StartTicket)) {
        if let Some(ticket) = self.ticket.take() {
            apply(self.store, ticket);
        }
    }
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            debug!("{} for {} cancelled", ticket.kind().command(), ticket.site());
            self.store.rollback_start(ticket);
        }
    }
}

/// 在途的停止请求，丢弃时清除停止标志
struct PendingStop<'a> {
    store: &'a StatusStore,
    site: &'a str,
    armed: bool,
}

impl PendingStop<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingStop<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("stop for {} cancelled", self.site);
            self.store.rollback_stop(self.site);
        }
    }
}

fn failed(site: &str, command: CommandKind, error: ApiError) -> CommandError {
    record(command, "failed");
    warn!("{} for {} failed: {}", command, site, error);
    CommandError::Failed {
        site: site.to_string(),
        command,
        message: error.to_string(),
    }
}

fn record(command: CommandKind, outcome: &'static str) {
    counter!(COMMANDS, "command" => command.to_string(), "outcome" => outcome).increment(1);
}
