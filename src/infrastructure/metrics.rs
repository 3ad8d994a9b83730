// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::config::settings::MetricsSettings;

/// 丢弃的入站帧计数
pub const FRAMES_DROPPED: &str = "scrapesync_frames_dropped_total";
/// 收到的站点状态事件计数
pub const STATUS_EVENTS: &str = "scrapesync_status_events_total";
/// 重连次数
pub const RECONNECTS: &str = "scrapesync_reconnects_total";
/// 发出的作业控制命令计数
pub const COMMANDS: &str = "scrapesync_commands_total";
/// 当前连接状态
pub const CONNECTION_STATUS: &str = "scrapesync_connection_status";

pub fn init_metrics(settings: &MetricsSettings) {
    if !settings.enabled {
        return;
    }

    let addr: SocketAddr = match settings.listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", settings.listen_addr, e);
            return;
        }
    };

    // Ignore error if address is already in use (for development/testing)
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}. This might happen if the port is already in use.", e);
        return;
    }

    info!("Metrics exporter listening on {}", addr);
}
