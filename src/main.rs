// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use scrapesync::application::sync_service::StatusSyncService;
use scrapesync::config::settings::Settings;
use scrapesync::infrastructure::metrics::init_metrics;
use scrapesync::utils::telemetry;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// 主函数
///
/// 加载配置，启动同步服务并持续记录站点状态变更，收到 Ctrl-C 后停止
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration and initialize logging
    let settings = Settings::new()?;
    telemetry::init_telemetry_with(&settings.telemetry);
    info!("Starting scrapesync...");

    // wss handshakes need a process-wide crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    // 2. Initialize Prometheus metrics
    init_metrics(&settings.metrics);

    // 3. Build and start the sync service
    let service = StatusSyncService::from_settings(&settings)?;
    let mut updates = service.store().subscribe();
    let report = service.start().await?;
    info!(
        "Initial snapshot: {} sites seeded{}",
        report.seeded,
        report
            .error
            .as_deref()
            .map(|e| format!(" (snapshot failed: {})", e))
            .unwrap_or_default()
    );
    for view in service.store().views() {
        info!("{}: {} ({}%)", view.site, view.status.state, view.progress);
    }

    // 4. Log status changes until Ctrl-C
    let mut connection = service.connection().watch();
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => {
                    let progress = scrapesync::domain::services::progress(&update.status);
                    info!(
                        site = %update.site,
                        job_type = %update.status.job_type,
                        state = %update.status.state,
                        progress,
                        "Site status updated"
                    );
                }
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} status updates", skipped),
                Err(RecvError::Closed) => break,
            },
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let info = connection.borrow_and_update().clone();
                info!(
                    status = %info.status,
                    attempts = info.reconnect_attempts,
                    "Connection status changed"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    service.stop().await?;
    service.shutdown().await;
    info!("scrapesync stopped");
    Ok(())
}
