// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::site_status::{JobType, SiteStatus};

/// 计算站点作业进度百分比
///
/// - 列表抓取且总页数为正：`round(100 * pages_scraped / total_pages)`
/// - 详情抓取且URL总数为正：`round(100 * urls_scraped / total_urls)`
/// - 其他情况为 0
///
/// 作业结束时计数器可能短暂不一致（已抓取数大于总数），结果始终限制在 `[0, 100]`。
pub fn progress(status: &SiteStatus) -> u8 {
    match status.job_type {
        JobType::Listings => match status.total_pages {
            Some(total) if total > 0 => percent(status.pages_scraped, total),
            _ => 0,
        },
        JobType::Details if status.total_urls > 0 => {
            percent(status.urls_scraped, status.total_urls)
        }
        _ => 0,
    }
}

/// 四舍五入（远离零）的整数百分比
fn percent(done: u64, total: u64) -> u8 {
    let done = u128::from(done);
    let total = u128::from(total);
    let rounded = (200 * done + total) / (2 * total);
    rounded.min(100) as u8
}
