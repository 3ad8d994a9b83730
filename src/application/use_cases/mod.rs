// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 用例模块
///
/// 启动对账和作业控制命令
pub mod command_dispatcher;
pub mod reconciliation;
