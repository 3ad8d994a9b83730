// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::site_status::SiteStatus;

/// 入站事件
///
/// 事件流中JSON信封 `{type, ...fields}` 解码后的类型化结果。
/// 未识别的 `type` 原样保留在 `Unknown` 中转发给订阅者。
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// 服务端握手，分配连接ID
    Connection {
        /// 连接ID
        connection_id: String,
    },
    /// 心跳应答
    Pong,
    /// 站点的完整抓取状态
    ScrapingStatus {
        /// 站点标识符
        target_site: String,
        /// 状态负载
        status: SiteStatus,
    },
    /// 其他类型，不做解释
    Unknown {
        /// 原始 `type` 字段
        kind: String,
        /// 完整的原始信封
        payload: serde_json::Value,
    },
}

impl InboundEvent {
    /// 事件类型名称，用于日志和指标标签
    pub fn kind(&self) -> &str {
        match self {
            InboundEvent::Connection { .. } => "connection",
            InboundEvent::Pong => "pong",
            InboundEvent::ScrapingStatus { .. } => "scraping_status",
            InboundEvent::Unknown { kind, .. } => kind,
        }
    }
}

/// `connection` 事件负载
#[derive(Debug, Deserialize)]
pub(crate) struct ConnectionPayload {
    pub connection_id: String,
}

/// `scraping_status` 事件负载
#[derive(Debug, Deserialize)]
pub(crate) struct ScrapingStatusPayload {
    pub target_site: String,
    #[serde(alias = "status")]
    pub data: SiteStatus,
}

/// 出站事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// 心跳
    Ping {
        /// 发送时间
        timestamp: DateTime<Utc>,
    },
    /// 订阅指定频道的更新
    Subscribe {
        /// 频道名称
        channel: String,
    },
}

impl OutboundEvent {
    /// 以当前时间创建心跳事件
    pub fn ping() -> Self {
        OutboundEvent::Ping {
            timestamp: Utc::now(),
        }
    }

    /// 创建订阅事件
    pub fn subscribe(channel: impl Into<String>) -> Self {
        OutboundEvent::Subscribe {
            channel: channel.into(),
        }
    }

    /// 事件类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::Ping { .. } => "ping",
            OutboundEvent::Subscribe { .. } => "subscribe",
        }
    }
}
