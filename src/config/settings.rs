// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// 应用程序配置设置
///
/// 包含 REST 接口、事件流、客户端存储、日志和指标等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// REST 接口配置
    pub api: ApiSettings,
    /// 事件流配置
    pub stream: StreamSettings,
    /// 客户端存储配置
    pub storage: StorageSettings,
    /// 日志配置
    pub telemetry: TelemetrySettings,
    /// 指标配置
    pub metrics: MetricsSettings,
}

/// REST 接口配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// REST 基础URL，事件流地址也由它推导
    pub base_url: String,
    /// 请求超时时间（秒），不设置则使用传输层默认值
    pub request_timeout_secs: Option<u64>,
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// 事件流配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    /// 追加在基础URL路径之后的固定路径
    pub path: String,
    /// 心跳间隔（秒），必须大于零
    pub ping_interval_secs: u64,
    /// 握手超时（秒），必须大于零
    pub connect_timeout_secs: u64,
    /// 意外断开后的重连间隔（秒）
    pub reconnect_interval_secs: u64,
    /// 主动重连时断开与再次连接之间的延迟（毫秒）
    pub reconnect_delay_ms: u64,
    /// 连续重连次数上限，不设置表示无限重试
    pub max_reconnect_attempts: Option<u32>,
    /// 每次连接成功后订阅的频道
    pub channels: Vec<String>,
}

impl StreamSettings {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            path: "/ws/scraping".to_string(),
            ping_interval_secs: 30,
            connect_timeout_secs: 10,
            reconnect_interval_secs: 3,
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: None,
            channels: vec!["scraping_status".to_string()],
        }
    }
}

/// 客户端存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// 存储类型 (file, memory)
    pub storage_type: String,
    /// 文件存储路径 (当 type=file 时使用)
    pub path: String,
}

/// 日志配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    /// 默认过滤规则，`RUST_LOG` 优先
    pub filter: String,
    /// 是否输出 JSON 格式日志
    pub json: bool,
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启动 Prometheus 导出器
    pub enabled: bool,
    /// 导出器监听地址
    pub listen_addr: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次合并默认值、`config/default`、`config/{APP_ENVIRONMENT}` 和
    /// `SCRAPESYNC__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("SCRAPESYNC")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("stream.channels")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    /// 仅使用内置默认值构建配置
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize::<Self>()?.validated()
    }

    /// 拒绝无法使用的取值
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.ping_interval_secs == 0 {
            return Err(ConfigError::Message(
                "stream.ping_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.stream.connect_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "stream.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let stream = StreamSettings::default();
        Config::builder()
            // Default API settings
            .set_default("api.base_url", "http://localhost:8000/api")?
            // Default stream settings
            .set_default("stream.path", stream.path)?
            .set_default("stream.ping_interval_secs", stream.ping_interval_secs)?
            .set_default("stream.connect_timeout_secs", stream.connect_timeout_secs)?
            .set_default("stream.reconnect_interval_secs", stream.reconnect_interval_secs)?
            .set_default("stream.reconnect_delay_ms", stream.reconnect_delay_ms)?
            .set_default("stream.channels", stream.channels)?
            // Default storage settings
            .set_default("storage.storage_type", "file")?
            .set_default("storage.path", "./.scrapesync/client_storage.json")?
            // Default telemetry settings
            .set_default("telemetry.filter", "info,scrapesync=debug")?
            .set_default("telemetry.json", false)?
            // Default metrics settings
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")
    }
}
