// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含状态同步的核心概念，包括：
/// - 领域模型（models）：站点状态、连接、事件和命令
/// - 仓库接口（repositories）：REST 接口和客户端存储的抽象
/// - 服务（services）：进度计算等纯业务规则
///
/// 领域层不依赖于任何外部实现。
pub mod models;
pub mod repositories;
pub mod services;
