// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

use crate::domain::repositories::client_storage::StorageError;
use crate::domain::repositories::status_api::ApiError;
use crate::realtime::connection_manager::ConnectionError;

/// 同步服务错误类型
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    #[error("连接错误: {0}")]
    Connection(#[from] ConnectionError),

    #[error("接口错误: {0}")]
    Api(#[from] ApiError),

    #[error("服务未启动")]
    NotStarted,

    #[error("服务已启动")]
    AlreadyStarted,
}
