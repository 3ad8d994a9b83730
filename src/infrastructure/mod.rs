// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 该模块包含与外部系统交互的技术实现：
/// - 指标（metrics）：Prometheus 导出器和指标名称
/// - 仓库实现（repositories）：基于 reqwest 的 REST 接口
/// - 存储（storage）：客户端持久化存储
///
/// 基础设施层依赖于领域层的抽象接口。
pub mod metrics;
pub mod repositories;
pub mod storage;
