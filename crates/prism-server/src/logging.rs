//! 日志初始化
//!
//! stderr 输出始终开启；配置了目录时另外写入按天滚动的文件。
//! `RUST_LOG` 优先于配置中的级别

use prism::config::LoggingConfig;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// 日志文件名前缀
pub const LOG_FILE_PREFIX: &str = "prismd";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create log appender: {0}")]
    Appender(String),

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// 持有后台写线程的 guard，drop 时刷新剩余日志
#[must_use]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// 构建过滤器：`RUST_LOG` 优先，其次是配置级别，都无效时退回 info
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 安装全局 subscriber
pub fn init(config: &LoggingConfig) -> Result<LogGuard, LoggingError> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.json {
        layers.push(
            fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .compact()
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    let mut file_guard = None;
    if let Some(dir) = &config.directory {
        std::fs::create_dir_all(dir)?;
        let appender = Builder::new()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .build(dir)
            .map_err(|e| LoggingError::Appender(e.to_string()))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let layer = if config.json {
            fmt::layer().json().with_writer(writer).boxed()
        } else {
            fmt::layer().with_ansi(false).with_writer(writer).boxed()
        };
        layers.push(layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(&config.level))
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(LogGuard { _file: file_guard })
}
