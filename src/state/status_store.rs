// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::domain::models::command::StartKind;
use crate::domain::models::site_status::{CyclePhase, JobState, SiteStatus};
use crate::domain::services::progress;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// 站点的本地控制标志
///
/// 两阶段的乐观状态：`starting` 表示启动请求在途，
/// `optimistic` 表示已收到 "started" 应答、尚待权威事件确认。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlFlags {
    /// 在途的启动请求
    pub starting: Option<StartKind>,
    /// 本地假定正在运行的作业
    pub optimistic: Option<StartKind>,
    /// 停止请求已发出、尚未确认
    pub stopping: bool,
}

/// 写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// 已替换
    Applied,
    /// 比现有记录旧，已丢弃
    Stale,
}

/// 控制标志检查失败的原因
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRejection {
    #[error("a {0} start is already in flight")]
    StartInFlight(StartKind),
    #[error("auto-cycle is running")]
    AutoCycleActive,
    #[error("a stop request is already in flight")]
    StopInFlight,
}

/// 启动请求凭据，由 `begin_start` 发放
#[derive(Debug, Clone)]
pub struct StartTicket {
    site: String,
    kind: StartKind,
    previous: ControlFlags,
    revision: u64,
}

impl StartTicket {
    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn kind(&self) -> StartKind {
        self.kind
    }
}

/// 面向界面的站点视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteView {
    /// 站点标识符
    pub site: String,
    /// 叠加乐观状态后的有效状态
    pub status: SiteStatus,
    /// 进度百分比
    pub progress: u8,
    /// 控制标志
    pub control: ControlFlags,
}

/// 状态变更通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUpdate {
    /// 站点标识符
    pub site: String,
    /// 变更后的有效状态
    pub status: SiteStatus,
    /// 变更后的控制标志
    pub control: ControlFlags,
}

#[derive(Debug, Default)]
struct SiteEntry {
    status: SiteStatus,
    /// 是否收到过事件流中的状态
    streamed: bool,
    /// 是否已被快照或事件提及
    listed: bool,
    /// 权威写入次数
    revision: u64,
    control: ControlFlags,
}

impl SiteEntry {
    fn effective(&self) -> SiteStatus {
        let mut status = self.status.clone();
        if let Some(kind) = self.control.optimistic {
            status.state = JobState::Running;
            status.job_type = kind.job_type();
            if kind == StartKind::AutoCycle {
                status.auto_cycle_running = true;
                status.phase = Some(CyclePhase::BasicListings);
            }
        }
        status
    }

    fn replace(&mut self, status: SiteStatus) {
        self.control.optimistic = None;
        if !status.is_active() {
            self.control.stopping = false;
        }
        self.status = status;
        self.revision += 1;
    }
}

#[derive(Debug, Default)]
struct Inner {
    /// 站点发现顺序
    order: Vec<String>,
    sites: HashMap<String, SiteEntry>,
}

impl Inner {
    /// 唯一的默认构造入口，站点从此出现在注册表中
    fn upsert_or_init(&mut self, site: &str) -> &mut SiteEntry {
        let entry = self.sites.entry(site.to_string()).or_default();
        if !entry.listed {
            debug!("Discovered site {}", site);
            entry.listed = true;
            self.order.push(site.to_string());
        }
        entry
    }

    /// 控制标志所在的记录；仅有命令的站点不进入注册表
    fn control_entry(&mut self, site: &str) -> &mut SiteEntry {
        self.sites.entry(site.to_string()).or_default()
    }
}

/// 站点状态存储
///
/// 站点标识符 → 站点状态的内存映射，是可查询的权威状态。
/// 存储本身不计算状态转换，只做索引、默认初始化和幂等替换。
/// 站点只增不减，会话期间不会删除。
pub struct StatusStore {
    inner: RwLock<Inner>,
    updates: broadcast::Sender<StoreUpdate>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            updates,
        }
    }

    /// 订阅状态变更
    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    /// 获取站点的有效状态，未见过的站点返回空闲默认值
    pub fn get(&self, site: &str) -> SiteStatus {
        self.inner
            .read()
            .sites
            .get(site)
            .map(SiteEntry::effective)
            .unwrap_or_default()
    }

    /// 站点是否已被发现
    pub fn contains(&self, site: &str) -> bool {
        self.inner
            .read()
            .sites
            .get(site)
            .is_some_and(|entry| entry.listed)
    }

    /// 按发现顺序列出所有站点
    pub fn list_sites(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// 站点的控制标志
    pub fn control(&self, site: &str) -> ControlFlags {
        self.inner
            .read()
            .sites
            .get(site)
            .map(|entry| entry.control)
            .unwrap_or_default()
    }

    /// 站点视图，包含进度和控制标志
    pub fn view(&self, site: &str) -> SiteView {
        let inner = self.inner.read();
        match inner.sites.get(site) {
            Some(entry) => to_view(site, entry),
            None => to_view(site, &SiteEntry::default()),
        }
    }

    /// 所有已发现站点的视图，按发现顺序
    pub fn views(&self) -> Vec<SiteView> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|site| inner.sites.get(site).map(|entry| to_view(site, entry)))
            .collect()
    }

    /// 确保站点存在，返回其有效状态
    pub fn upsert_or_init(&self, site: &str) -> SiteStatus {
        let mut inner = self.inner.write();
        inner.upsert_or_init(site).effective()
    }

    /// 用事件流中的完整状态替换站点记录
    ///
    /// 带时间戳且早于现有记录的状态会被丢弃；重复应用同一状态结果不变。
    pub fn upsert(&self, site: &str, status: SiteStatus) -> UpsertOutcome {
        let update = {
            let mut inner = self.inner.write();
            let entry = inner.upsert_or_init(site);
            if !entry.status.is_superseded_by(&status) {
                trace!("Discarding stale status for {}", site);
                return UpsertOutcome::Stale;
            }
            entry.replace(status);
            entry.streamed = true;
            to_update(site, entry)
        };
        self.notify(update);
        UpsertOutcome::Applied
    }

    /// 用快照中的状态初始化站点
    ///
    /// 已收到过事件流状态的站点，仅当快照严格更新时才覆盖。
    pub fn seed(&self, site: &str, status: SiteStatus) -> UpsertOutcome {
        let update = {
            let mut inner = self.inner.write();
            let entry = inner.upsert_or_init(site);
            if entry.streamed {
                let newer = matches!(
                    (entry.status.last_update, status.last_update),
                    (Some(current), Some(snapshot)) if snapshot > current
                );
                if !newer {
                    debug!("Snapshot for {} is older than streamed status", site);
                    return UpsertOutcome::Stale;
                }
            }
            entry.replace(status);
            to_update(site, entry)
        };
        self.notify(update);
        UpsertOutcome::Applied
    }

    /// 登记一个启动请求
    ///
    /// 同一站点已有启动请求在途时拒绝；自动循环运行期间拒绝列表和详情启动。
    pub fn begin_start(&self, site: &str, kind: StartKind) -> Result<StartTicket, ControlRejection> {
        let (ticket, update) = {
            let mut inner = self.inner.write();
            let entry = inner.control_entry(site);
            if let Some(pending) = entry.control.starting {
                return Err(ControlRejection::StartInFlight(pending));
            }
            if kind != StartKind::AutoCycle && entry.effective().auto_cycle_running {
                return Err(ControlRejection::AutoCycleActive);
            }
            let ticket = StartTicket {
                site: site.to_string(),
                kind,
                previous: entry.control,
                revision: entry.revision,
            };
            entry.control.starting = Some(kind);
            (ticket, to_update(site, entry))
        };
        self.notify(update);
        Ok(ticket)
    }

    /// 收到 "started" 应答：进入乐观运行状态
    ///
    /// 若应答返回前已有权威事件到达，以权威事件为准，不再设置乐观标志。
    pub fn confirm_started(&self, ticket: StartTicket) {
        let update = {
            let mut inner = self.inner.write();
            let entry = inner.control_entry(&ticket.site);
            entry.control.starting = None;
            if entry.revision == ticket.revision {
                entry.control.optimistic = Some(ticket.kind);
            }
            to_update(&ticket.site, entry)
        };
        self.notify(update);
    }

    /// 收到同步完成应答：直接标记为已完成
    pub fn complete_locally(&self, ticket: StartTicket) {
        let update = {
            let mut inner = self.inner.write();
            let entry = inner.control_entry(&ticket.site);
            entry.control.starting = None;
            entry.control.optimistic = None;
            entry.status.state = JobState::Completed;
            entry.status.job_type = ticket.kind.job_type();
            if ticket.kind == StartKind::AutoCycle {
                entry.status.auto_cycle_running = false;
            }
            to_update(&ticket.site, entry)
        };
        self.notify(update);
    }

    /// 启动失败：恢复请求前的控制标志
    pub fn rollback_start(&self, ticket: StartTicket) {
        let update = {
            let mut inner = self.inner.write();
            let entry = inner.control_entry(&ticket.site);
            entry.control.starting = ticket.previous.starting;
            entry.control.optimistic = if entry.revision == ticket.revision {
                ticket.previous.optimistic
            } else {
                None
            };
            to_update(&ticket.site, entry)
        };
        self.notify(update);
    }

    /// 登记一个停止请求，已有停止请求在途时拒绝
    pub fn begin_stop(&self, site: &str) -> Result<(), ControlRejection> {
        let update = {
            let mut inner = self.inner.write();
            let entry = inner.control_entry(site);
            if entry.control.stopping {
                return Err(ControlRejection::StopInFlight);
            }
            entry.control.stopping = true;
            to_update(site, entry)
        };
        self.notify(update);
        Ok(())
    }

    /// 收到同步停止应答：直接标记为已停止
    pub fn stop_completed_locally(&self, site: &str) {
        let update = {
            let mut inner = self.inner.write();
            let entry = inner.control_entry(site);
            entry.control.stopping = false;
            entry.control.optimistic = None;
            entry.status.state = JobState::Stopped;
            entry.status.auto_cycle_running = false;
            to_update(site, entry)
        };
        self.notify(update);
    }

    /// 收到非 "stopped" 的停止应答
    ///
    /// 站点已经处于非活动状态时不会再有确认事件，直接清除停止标志。
    pub fn stop_acknowledged(&self, site: &str) {
        let update = {
            let mut inner = self.inner.write();
            let entry = inner.control_entry(site);
            if entry.effective().is_active() {
                return;
            }
            entry.control.stopping = false;
            to_update(site, entry)
        };
        self.notify(update);
    }

    /// 停止失败：清除停止标志
    pub fn rollback_stop(&self, site: &str) {
        let update = {
            let mut inner = self.inner.write();
            let entry = inner.control_entry(site);
            entry.control.stopping = false;
            to_update(site, entry)
        };
        self.notify(update);
    }

    fn notify(&self, update: StoreUpdate) {
        // No receivers is fine
        let _ = self.updates.send(update);
    }
}

fn to_view(site: &str, entry: &SiteEntry) -> SiteView {
    let status = entry.effective();
    SiteView {
        site: site.to_string(),
        progress: progress(&status),
        status,
        control: entry.control,
    }
}

fn to_update(site: &str, entry: &SiteEntry) -> StoreUpdate {
    StoreUpdate {
        site: site.to_string(),
        status: entry.effective(),
        control: entry.control,
    }
}
