//! 配置模块
//!
//! 进程级配置，所有字段都有默认值，可以只覆盖部分字段。
//! 加载顺序（默认值、TOML 文件、环境变量、命令行）由 `prismd` 负责，
//! 这里只定义结构和校验

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::network::TimeoutConfig;
use crate::providers::Modality;
use crate::store::StoreOptions;

/// 单个会话允许的最大并发上游请求数
pub const MAX_FAN_OUT: usize = 16;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key is not configured")]
    MissingApiKey,

    #[error("Fan-out degree must be between 1 and {max}, got {0}", max = MAX_FAN_OUT)]
    InvalidFanOut(usize),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 生成 API 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API 密钥
    #[serde(default)]
    pub api_key: Option<String>,
    /// API 根地址
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 模型名
    #[serde(default = "default_model")]
    pub model: String,
    /// 默认宽高比
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    /// 默认图片尺寸
    #[serde(default = "default_image_size")]
    pub image_size: String,
    /// 默认输出模态
    #[serde(default)]
    pub modality: Modality,
}

fn default_base_url() -> String {
    "https://aihubmix.com/gemini".to_string()
}
fn default_model() -> String {
    "gemini-3-pro-image-preview".to_string()
}
fn default_aspect_ratio() -> String {
    "1:1".to_string()
}
fn default_image_size() -> String {
    "1k".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            aspect_ratio: default_aspect_ratio(),
            image_size: default_image_size(),
            modality: Modality::default(),
        }
    }
}

impl ProviderConfig {
    /// 去除空白后的有效密钥
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// 扇出配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutConfig {
    /// 每个会话的并发上游请求数
    #[serde(default = "default_degree")]
    pub degree: usize,
    /// 是否向客户端转发文本增量
    #[serde(default = "default_true")]
    pub forward_text: bool,
    /// 是否保留思考过程（thought）部分
    #[serde(default)]
    pub include_thoughts: bool,
}

fn default_degree() -> usize {
    4
}
fn default_true() -> bool {
    true
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            degree: default_degree(),
            forward_text: true,
            include_thoughts: false,
        }
    }
}

/// 保留策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// 是否启用定期清理
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 文件最长保留时间（小时）
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
    /// 清理间隔（秒）
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_max_age_hours() -> u64 {
    24
}
fn default_sweep_interval() -> u64 {
    3600
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_hours: default_max_age_hours(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// HTTP 服务配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    2983
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 默认过滤级别，可被 `RUST_LOG` 覆盖
    #[serde(default = "default_level")]
    pub level: String,
    /// 输出 JSON 格式
    #[serde(default)]
    pub json: bool,
    /// 按天滚动的日志文件目录，未设置时只输出到 stderr
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            directory: None,
        }
    }
}

/// 进程配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrismConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub fan_out: FanOutConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub store: StoreOptions,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PrismConfig {
    /// 校验配置，在启动任何上游任务之前调用
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.api_key().is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        validate_fan_out(self.fan_out.degree)?;

        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigError::invalid_value("provider.base_url", "must not be empty"));
        }
        if self.provider.model.trim().is_empty() {
            return Err(ConfigError::invalid_value("provider.model", "must not be empty"));
        }
        if self.timeouts.request_ms == 0 {
            return Err(ConfigError::invalid_value("timeouts.request_ms", "must be positive"));
        }
        if self.retention.enabled && self.retention.sweep_interval_secs == 0 {
            return Err(ConfigError::invalid_value(
                "retention.sweep_interval_secs",
                "must be positive when retention is enabled",
            ));
        }
        Ok(())
    }
}

/// 校验扇出数
pub fn validate_fan_out(degree: usize) -> Result<(), ConfigError> {
    if (1..=MAX_FAN_OUT).contains(&degree) {
        Ok(())
    } else {
        Err(ConfigError::InvalidFanOut(degree))
    }
}
