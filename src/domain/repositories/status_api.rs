// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::command::{
    AutoCycleOptions, CommandAck, DetailsOptions, ListingsOptions,
};
/// REST 快照：站点 → 未解码的状态；尚未注册的站点为 `None`
///
/// 每个站点单独解码，一个站点的无效状态不影响其他站点。
pub type StatusSnapshot = HashMap<String, Option<serde_json::Value>>;

/// 抓取服务 REST 接口错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    /// 传输层错误
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// 服务端返回非成功状态码
    #[error("Unexpected status {status}: {body}")]
    Status {
        /// HTTP 状态码
        status: u16,
        /// 响应体
        body: String,
    },
    /// 响应无法解析
    #[error("Invalid response: {0}")]
    Decode(String),
}

/// 抓取状态 REST 接口特质
///
/// 快照读取和作业控制命令，具体实现见基础设施层。
#[async_trait]
pub trait StatusApi: Send + Sync {
    /// 获取所有站点的状态快照
    async fn fetch_snapshot(&self) -> Result<StatusSnapshot, ApiError>;

    /// 启动列表抓取
    async fn start_listings(
        &self,
        site: &str,
        options: &ListingsOptions,
    ) -> Result<CommandAck, ApiError>;

    /// 启动详情抓取
    async fn start_details(
        &self,
        site: &str,
        options: &DetailsOptions,
    ) -> Result<CommandAck, ApiError>;

    /// 启动自动循环
    async fn start_auto_cycle(
        &self,
        site: &str,
        options: &AutoCycleOptions,
    ) -> Result<CommandAck, ApiError>;

    /// 请求停止站点当前作业
    async fn stop(&self, site: &str) -> Result<CommandAck, ApiError>;
}
