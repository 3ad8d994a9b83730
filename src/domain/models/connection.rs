// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 连接状态枚举
///
/// 状态转换：
/// Disconnected → Connecting → Connected/Error，
/// 意外关闭后回到 Disconnected 并安排重连。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// 正在连接
    Connecting,
    /// 已连接
    Connected,
    /// 已断开
    #[default]
    Disconnected,
    /// 连接出错
    Error,
}

impl ConnectionStatus {
    /// 指标使用的数值
    pub fn as_gauge(&self) -> f64 {
        match self {
            ConnectionStatus::Disconnected => 0.0,
            ConnectionStatus::Connecting => 0.5,
            ConnectionStatus::Connected => 1.0,
            ConnectionStatus::Error => -1.0,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

/// 连接信息
///
/// 由连接管理器独占写入，其他组件通过 watch 通道只读访问。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionInfo {
    /// 当前连接状态
    pub status: ConnectionStatus,
    /// 服务端分配的连接ID，用于重连时恢复会话
    pub connection_id: Option<String>,
    /// 自上次成功连接以来的连续重连次数
    pub reconnect_attempts: u32,
}
