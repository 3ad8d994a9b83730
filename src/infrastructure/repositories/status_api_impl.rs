// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::Serialize;
use tracing::debug;

use crate::domain::models::command::{
    AutoCycleOptions, CommandAck, CommandRequest, DetailsOptions, ListingsOptions,
};
use crate::domain::repositories::client_storage::{ClientStorage, AUTH_TOKEN_KEY};
use crate::domain::repositories::status_api::{ApiError, StatusApi, StatusSnapshot};

const SNAPSHOT_PATH: &str = "/scraping/status";
const START_LISTINGS_PATH: &str = "/scraping/listings/start";
const START_DETAILS_PATH: &str = "/scraping/details/start";
const START_AUTO_CYCLE_PATH: &str = "/scraping/auto-cycle/start";
const STOP_PATH: &str = "/scraping/stop";

/// 基于 reqwest 的抓取状态 REST 接口实现
///
/// 每次请求都从客户端存储读取认证令牌，令牌更新后立即生效。
pub struct HttpStatusApi {
    client: Client,
    base_url: String,
    storage: Arc<dyn ClientStorage>,
}

impl HttpStatusApi {
    /// 创建新的 REST 接口实例
    ///
    /// # 参数
    ///
    /// * `base_url` - REST 基础URL
    /// * `timeout` - 可选的请求超时
    /// * `storage` - 读取认证令牌的客户端存储
    pub fn new(
        base_url: impl Into<String>,
        timeout: Option<Duration>,
        storage: Arc<dyn ClientStorage>,
    ) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(concat!("scrapesync/", env!("CARGO_PKG_VERSION"))),
        );
        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            storage,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.storage.get(AUTH_TOKEN_KEY) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post_command<O: Serialize + Send + Sync>(
        &self,
        path: &str,
        site: &str,
        options: O,
    ) -> Result<CommandAck, ApiError> {
        let body = CommandRequest {
            target_site: site,
            options,
        };
        debug!("POST {} for site {}", path, site);
        let response = self
            .authorized(self.client.post(self.endpoint(path)))
            .json(&body)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl StatusApi for HttpStatusApi {
    async fn fetch_snapshot(&self) -> Result<StatusSnapshot, ApiError> {
        let response = self
            .authorized(self.client.get(self.endpoint(SNAPSHOT_PATH)))
            .send()
            .await?;
        read_json(response).await
    }

    async fn start_listings(
        &self,
        site: &str,
        options: &ListingsOptions,
    ) -> Result<CommandAck, ApiError> {
        self.post_command(START_LISTINGS_PATH, site, options).await
    }

    async fn start_details(
        &self,
        site: &str,
        options: &DetailsOptions,
    ) -> Result<CommandAck, ApiError> {
        self.post_command(START_DETAILS_PATH, site, options).await
    }

    async fn start_auto_cycle(
        &self,
        site: &str,
        options: &AutoCycleOptions,
    ) -> Result<CommandAck, ApiError> {
        self.post_command(START_AUTO_CYCLE_PATH, site, options).await
    }

    async fn stop(&self, site: &str) -> Result<CommandAck, ApiError> {
        self.post_command(STOP_PATH, site, serde_json::Map::new())
            .await
    }
}
