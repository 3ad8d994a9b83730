// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 对账、作业控制用例和同步服务的生命周期
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 站点状态、事件和命令模型，进度计算以及接口定义
pub mod domain;

/// 基础设施模块
///
/// REST 接口实现、客户端持久存储和指标导出
pub mod infrastructure;

/// 实时模块
///
/// 事件流连接管理和入站消息路由
pub mod realtime;

/// 状态模块
///
/// 站点状态的内存存储
pub mod state;

/// 工具模块
///
/// 错误类型和日志初始化
pub mod utils;
