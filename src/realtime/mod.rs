// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 实时事件流模块
///
/// 持久连接的生命周期、入站帧路由和事件流地址推导
pub mod connection_manager;
pub mod message_router;
pub mod stream_url;
