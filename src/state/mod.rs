// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 状态模块
///
/// 站点状态的内存存储，供事件路由写入、界面读取
pub mod status_store;

pub use status_store::{ControlFlags, SiteView, StatusStore, StoreUpdate, UpsertOutcome};
