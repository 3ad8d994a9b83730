// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use url::Url;

use crate::realtime::connection_manager::ConnectionError;

/// 由 REST 基础URL推导事件流地址
///
/// `http→ws`、`https→wss`，在基础路径后追加固定路径；
/// 已知连接ID时附加 `connection_id` 查询参数以请求恢复会话。
///
/// # 参数
///
/// * `base_url` - REST 基础URL，例如 `http://localhost:8000/api`
/// * `path` - 事件流固定路径，例如 `/ws/scraping`
/// * `connection_id` - 上次会话的连接ID
pub fn derive_stream_url(
    base_url: &str,
    path: &str,
    connection_id: Option<&str>,
) -> Result<Url, ConnectionError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ConnectionError::InvalidUrl(format!("{}: {}", base_url, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConnectionError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ConnectionError::InvalidUrl(format!("cannot use scheme {}", scheme)))?;

    let joined = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url.set_query(None);
    url.set_fragment(None);

    if let Some(id) = connection_id.filter(|id| !id.is_empty()) {
        url.query_pairs_mut().append_pair("connection_id", id);
    }

    Ok(url)
}
