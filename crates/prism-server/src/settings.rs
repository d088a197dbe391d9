//! 配置加载
//!
//! 加载顺序：默认值、TOML 文件、`PRISM__` 前缀的环境变量、命令行参数。
//! 环境变量用双下划线分隔层级，例如 `PRISM__FAN_OUT__DEGREE=8`。
//! 密钥还可以来自 `PRISM_API_KEY` 或 `AIHUBMIX_API_KEY`

use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use prism::config::ConfigError;
use prism::PrismConfig;
use std::path::PathBuf;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "PRISM";

/// 兜底的密钥环境变量，按顺序查找
pub const API_KEY_VARS: [&str; 2] = ["PRISM_API_KEY", "AIHUBMIX_API_KEY"];

#[derive(Debug, Default, Parser)]
#[command(name = "prismd", version, about = "Fan-out image generation server")]
pub struct Cli {
    /// TOML 配置文件路径
    #[arg(short, long, env = "PRISM_CONFIG")]
    pub config: Option<PathBuf>,

    /// 监听地址
    #[arg(long)]
    pub host: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    pub port: Option<u16>,

    /// 每个会话的并发上游请求数
    #[arg(long)]
    pub fan_out: Option<usize>,

    /// 附件存储根目录
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// 日志级别
    #[arg(long)]
    pub log_level: Option<String>,

    /// 输出 JSON 格式日志
    #[arg(long)]
    pub log_json: bool,

    /// 日志文件目录
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

/// 从进程环境加载配置
pub fn load(cli: &Cli) -> Result<PrismConfig, ConfigError> {
    load_from(cli, None)
}

/// 加载配置；`env` 为 `Some` 时用它代替进程环境
pub fn load_from(
    cli: &Cli,
    env: Option<config::Map<String, String>>,
) -> Result<PrismConfig, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = &cli.config {
        builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env.clone()),
    );

    let mut config: PrismConfig = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    if config.provider.api_key().is_none() {
        config.provider.api_key = fallback_api_key(env.as_ref());
    }
    apply_cli(&mut config, cli);
    Ok(config)
}

fn fallback_api_key(env: Option<&config::Map<String, String>>) -> Option<String> {
    API_KEY_VARS
        .iter()
        .filter_map(|name| match env {
            Some(map) => map.get(*name).cloned(),
            None => std::env::var(name).ok(),
        })
        .find(|key| !key.trim().is_empty())
}

fn apply_cli(config: &mut PrismConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(degree) = cli.fan_out {
        config.fan_out.degree = degree;
    }
    if let Some(dir) = &cli.cache_dir {
        config.store.root = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.log_json {
        config.logging.json = true;
    }
    if let Some(dir) = &cli.log_dir {
        config.logging.directory = Some(dir.clone());
    }
}
