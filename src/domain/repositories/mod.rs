// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 领域层依赖的外部资源抽象：
/// - 客户端存储（client_storage）：认证令牌和连接ID的持久化
/// - 状态接口（status_api）：快照读取和作业控制命令
pub mod client_storage;
pub mod status_api;
