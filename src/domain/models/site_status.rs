// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 站点抓取状态
///
/// 每个抓取数据源（站点）一条记录，以站点标识符为键。
/// 事件总是携带完整状态而非增量，因此重复应用同一事件是安全的。
/// 所有字段都有默认值，`{"state":"idle"}` 这样的部分负载也可以解码。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SiteStatus {
    /// 当前或最近一次执行的作业类型
    pub job_type: JobType,
    /// 作业状态
    pub state: JobState,
    /// 已抓取的列表页数
    pub pages_scraped: u64,
    /// 列表总页数，未知时为空
    pub total_pages: Option<u64>,
    /// 发现的商品条目数
    pub listings_found: u64,
    /// 已保存的商品条目数
    pub listings_saved: u64,
    /// 已抓取的详情页URL数
    pub urls_scraped: u64,
    /// 详情页URL总数
    pub total_urls: u64,
    /// 正在处理的URL
    pub current_url: Option<String>,
    /// 自动循环是否运行中，与 `state` 正交
    pub auto_cycle_running: bool,
    /// 自动循环轮次
    pub cycle_number: u64,
    /// 自动循环当前阶段
    pub phase: Option<CyclePhase>,
    /// 自动循环两轮之间的等待分钟数
    pub wait_minutes: u64,
    /// 作业失败时的错误描述
    pub error_message: Option<String>,
    /// 最近一次应用的事件时间，用于丢弃乱序消息
    pub last_update: Option<DateTime<Utc>>,
}

impl SiteStatus {
    /// 新发现站点的默认状态：空闲、计数器为零、自动循环未运行
    pub fn idle() -> Self {
        Self::default()
    }

    /// 作业是否处于活动状态（单次作业运行中或自动循环运行中）
    pub fn is_active(&self) -> bool {
        self.state == JobState::Running || self.auto_cycle_running
    }

    /// 判断 `incoming` 相对于当前记录是否过期
    ///
    /// 仅当双方都带有时间戳且传入时间严格早于当前时间时视为过期；
    /// 任意一方缺少时间戳时按后写入者为准。
    pub fn is_superseded_by(&self, incoming: &SiteStatus) -> bool {
        match (self.last_update, incoming.last_update) {
            (Some(current), Some(next)) => next >= current,
            _ => true,
        }
    }
}

/// 作业类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// 没有作业
    #[default]
    None,
    /// 列表页抓取（基础抓取）
    Listings,
    /// 详情页抓取
    Details,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobType::None => write!(f, "none"),
            JobType::Listings => write!(f, "listings"),
            JobType::Details => write!(f, "details"),
        }
    }
}

impl FromStr for JobType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(JobType::None),
            "listings" => Ok(JobType::Listings),
            "details" => Ok(JobType::Details),
            _ => Err(()),
        }
    }
}

/// 作业状态枚举
///
/// 状态机由抓取端负责，本地只做整体替换：
/// Idle → Running → Completed/Stopped/Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// 空闲
    #[default]
    Idle,
    /// 运行中
    Running,
    /// 已完成
    Completed,
    /// 已停止
    Stopped,
    /// 出错
    Error,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobState::Idle => write!(f, "idle"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Stopped => write!(f, "stopped"),
            JobState::Error => write!(f, "error"),
        }
    }
}

impl FromStr for JobState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(JobState::Idle),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "stopped" => Ok(JobState::Stopped),
            "error" => Ok(JobState::Error),
            _ => Err(()),
        }
    }
}

/// 自动循环阶段
///
/// 列表抓取 → 详情抓取 → 等待 → 重复
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// 基础列表抓取
    BasicListings,
    /// 详情抓取
    Details,
    /// 等待下一轮
    Waiting,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CyclePhase::BasicListings => write!(f, "basic_listings"),
            CyclePhase::Details => write!(f, "details"),
            CyclePhase::Waiting => write!(f, "waiting"),
        }
    }
}
