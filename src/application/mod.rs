// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 组合领域、状态和实时连接，提供同步服务的生命周期
pub mod sync_service;
pub mod use_cases;
