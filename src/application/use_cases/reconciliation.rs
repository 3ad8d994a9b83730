// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::models::site_status::SiteStatus;
use crate::domain::repositories::status_api::StatusApi;
use crate::state::status_store::{StatusStore, UpsertOutcome};

/// 一次对账的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// 写入存储的站点数
    pub seeded: usize,
    /// 快照中为 null 的站点数
    pub skipped_null: usize,
    /// 因事件流已有更新状态而跳过的站点数
    pub skipped_stale: usize,
    /// 状态无法解码的站点数
    pub skipped_invalid: usize,
    /// 快照获取失败时的错误信息
    pub error: Option<String>,
}

impl ReconcileReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 启动时对账用例
///
/// 获取一次全部站点的 REST 快照并写入状态存储，此后不再轮询。
pub struct ReconciliationService<A: ?Sized> {
    api: Arc<A>,
    store: Arc<StatusStore>,
}

impl<A> ReconciliationService<A>
where
    A: StatusApi + ?Sized,
{
    pub fn new(api: Arc<A>, store: Arc<StatusStore>) -> Self {
        Self { api, store }
    }

    /// 拉取快照并初始化存储
    ///
    /// 获取失败不会中断启动：记录日志并保持存储不变，等待事件流填充。
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let snapshot = match self.api.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to fetch status snapshot, starting empty: {}", e);
                report.error = Some(e.to_string());
                return report;
            }
        };

        // 按站点名排序，保证发现顺序稳定
        let mut entries: Vec<_> = snapshot.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (site, raw) in entries {
            let Some(raw) = raw else {
                report.skipped_null += 1;
                continue;
            };
            let status = match serde_json::from_value::<SiteStatus>(raw) {
                Ok(status) => status,
                Err(e) => {
                    warn!("Skipping invalid snapshot entry for {}: {}", site, e);
                    report.skipped_invalid += 1;
                    continue;
                }
            };
            match self.store.seed(&site, status) {
                UpsertOutcome::Applied => report.seeded += 1,
                UpsertOutcome::Stale => report.skipped_stale += 1,
            }
        }

        info!(
            "Seeded {} sites from snapshot ({} unregistered, {} already streamed, {} invalid)",
            report.seeded, report.skipped_null, report.skipped_stale, report.skipped_invalid
        );
        report
    }
}
