// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 不依赖任何外部资源的纯业务规则
pub mod progress;

pub use progress::progress;
