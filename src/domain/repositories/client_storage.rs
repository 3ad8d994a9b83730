// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

/// 认证令牌的存储键
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// 连接ID的存储键
pub const CONNECTION_ID_KEY: &str = "connection_id";

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// 客户端持久化存储特质
///
/// 跨进程重启保留的少量键值，例如认证令牌和连接ID。
pub trait ClientStorage: Send + Sync {
    /// 读取键对应的值
    fn get(&self, key: &str) -> Option<String>;

    /// 写入键值
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// 删除键
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
