// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::settings::TelemetrySettings;

const DEFAULT_FILTER: &str = "info,scrapesync=debug";

pub fn init_telemetry() {
    init_telemetry_with(&TelemetrySettings {
        filter: DEFAULT_FILTER.to_string(),
        json: false,
    });
}

/// 按配置初始化日志，`RUST_LOG` 优先于配置中的过滤规则
///
/// 重复初始化时保留已安装的订阅者。
pub fn init_telemetry_with(settings: &TelemetrySettings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| settings.filter.as_str().into());

    let result = if settings.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!("Telemetry already initialized: {}", e);
    }
}
