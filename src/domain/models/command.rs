// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::models::site_status::JobType;

/// 作业控制命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// 启动列表抓取
    StartListings,
    /// 启动详情抓取
    StartDetails,
    /// 启动自动循环
    StartAutoCycle,
    /// 停止
    Stop,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandKind::StartListings => write!(f, "start_listings"),
            CommandKind::StartDetails => write!(f, "start_details"),
            CommandKind::StartAutoCycle => write!(f, "start_auto_cycle"),
            CommandKind::Stop => write!(f, "stop"),
        }
    }
}

/// 启动类命令的种类
///
/// 同一站点同一时刻最多只有一个启动请求在途。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartKind {
    /// 列表抓取
    Listings,
    /// 详情抓取
    Details,
    /// 自动循环
    AutoCycle,
}

impl StartKind {
    /// 对应的命令
    pub fn command(&self) -> CommandKind {
        match self {
            StartKind::Listings => CommandKind::StartListings,
            StartKind::Details => CommandKind::StartDetails,
            StartKind::AutoCycle => CommandKind::StartAutoCycle,
        }
    }

    /// 启动后预期的作业类型；自动循环从列表抓取开始
    pub fn job_type(&self) -> JobType {
        match self {
            StartKind::Listings | StartKind::AutoCycle => JobType::Listings,
            StartKind::Details => JobType::Details,
        }
    }
}

impl fmt::Display for StartKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StartKind::Listings => write!(f, "listings"),
            StartKind::Details => write!(f, "details"),
            StartKind::AutoCycle => write!(f, "auto_cycle"),
        }
    }
}

/// 列表抓取参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListingsOptions {
    /// 最多抓取的页数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
}

/// 详情抓取参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetailsOptions {
    /// 每批处理的URL数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
}

/// 自动循环参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoCycleOptions {
    /// 每轮最多抓取的列表页数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    /// 每批处理的详情URL数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// 两轮之间等待的分钟数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_minutes: Option<u32>,
}

/// 命令请求体 `{target_site, ...options}`
#[derive(Debug, Clone, Serialize)]
pub struct CommandRequest<'a, O: Serialize> {
    /// 目标站点
    pub target_site: &'a str,
    /// 命令相关参数
    #[serde(flatten)]
    pub options: O,
}

/// 命令同步应答中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// 已启动，后续状态由事件流给出
    Started,
    /// 短作业在返回前已完成
    Completed,
    /// 已同步停止
    Stopped,
}

/// 命令应答
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandAck {
    /// 应答状态
    pub status: AckStatus,
    /// 附带消息
    #[serde(default)]
    pub message: Option<String>,
    /// 其余字段
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
