//! 附件存储共享类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::media::{Variant, DEFAULT_IMAGE_MIME, DEFAULT_THUMBNAIL_EDGE};

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid attachment key: {0}")]
    InvalidKey(String),
}

/// 存储配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// 存储根目录
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// 缩略图边界框边长
    #[serde(default = "default_thumbnail_edge")]
    pub thumbnail_edge: u32,
    /// 未识别 MIME 类型时使用的类型
    #[serde(default = "default_mime")]
    pub default_mime: String,
}

fn default_root() -> PathBuf {
    PathBuf::from("./cache")
}
fn default_thumbnail_edge() -> u32 {
    DEFAULT_THUMBNAIL_EDGE
}
fn default_mime() -> String {
    DEFAULT_IMAGE_MIME.to_string()
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            root: default_root(),
            thumbnail_edge: default_thumbnail_edge(),
            default_mime: default_mime(),
        }
    }
}

impl StoreOptions {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

/// 已持久化的附件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAttachment {
    pub key: String,
    pub mime_type: String,
    pub size: u64,
    pub path: PathBuf,
    /// 缩略图生成失败时为 `None`
    pub thumbnail: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

/// 附件信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub key: String,
    pub mime_type: String,
    pub size: u64,
    pub path: PathBuf,
    pub has_thumbnail: bool,
    pub modified_at: DateTime<Utc>,
}

/// 存储统计（不含缩略图）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_images: u64,
    pub total_bytes: u64,
    pub last_cleanup: Option<DateTime<Utc>>,
    pub image_dir: PathBuf,
    pub table_dir: PathBuf,
}

/// 清理结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub deleted_count: usize,
    pub freed_bytes: u64,
    pub deleted_files: Vec<String>,
    /// 因竞争或权限问题跳过的文件数
    pub skipped: usize,
}

/// 表格格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    Csv,
    Xlsx,
}

impl TableFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Xlsx => "xlsx",
        }
    }

    pub fn all() -> [TableFormat; 2] {
        [TableFormat::Csv, TableFormat::Xlsx]
    }
}

/// 校验 key，拒绝可能造成路径穿越的字符
///
/// 以缩略图后缀结尾的 key 同样被拒绝，否则它会命中另一个附件的缩略图文件
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !key.ends_with(Variant::Thumbnail.file_suffix());

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
