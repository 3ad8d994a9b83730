// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了状态同步的核心数据结构，包括：
/// - 命令（command）：作业控制命令、参数和同步应答
/// - 连接（connection）：事件流连接的状态和身份
/// - 事件（event）：事件流的入站/出站消息
/// - 站点状态（site_status）：单个站点抓取作业的完整状态
pub mod command;
pub mod connection;
pub mod event;
pub mod site_status;
