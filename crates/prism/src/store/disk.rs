//! 文件系统附件存储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::*;
use super::AttachmentWriter;
use crate::media::{
    extension_for_mime, mime_for_extension, render_thumbnail, Variant, IMAGE_EXTENSIONS,
};

/// 附件存储
///
/// 由进程持有并以 `Arc` 共享给各会话；不同 key 的写入互不影响，
/// 新文件以 `create_new` 创建，已分配的 key 不会被覆盖
pub struct AttachmentStore {
    root: PathBuf,
    image_dir: PathBuf,
    table_dir: PathBuf,
    thumbnail_edge: u32,
    default_mime: String,
    total_images: AtomicU64,
    total_bytes: AtomicU64,
    pub(super) last_cleanup: Mutex<Option<DateTime<Utc>>>,
}

impl AttachmentStore {
    /// 打开存储，必要时创建目录，并从磁盘重建统计
    pub async fn open(options: StoreOptions) -> Result<Self, StoreError> {
        let image_dir = options.root.join("images");
        let table_dir = options.root.join("tables");
        fs::create_dir_all(&image_dir).await?;
        fs::create_dir_all(&table_dir).await?;

        let default_mime = if extension_for_mime(&options.default_mime).is_some() {
            options.default_mime
        } else {
            warn!(
                "默认 MIME 类型 {} 不受支持，回退到 image/png",
                options.default_mime
            );
            "image/png".to_string()
        };

        let store = Self {
            root: options.root,
            image_dir,
            table_dir,
            thumbnail_edge: options.thumbnail_edge,
            default_mime,
            total_images: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            last_cleanup: Mutex::new(None),
        };
        let stats = store.refresh_stats().await?;
        info!(
            root = %store.root.display(),
            images = stats.total_images,
            bytes = stats.total_bytes,
            "附件存储已打开"
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn table_dir(&self) -> &Path {
        &self.table_dir
    }

    /// 保存图片，分配新 key，并尽力生成缩略图
    ///
    /// 原图写入失败时返回错误；缩略图失败只记录日志
    pub async fn put(&self, payload: Vec<u8>, mime_type: &str) -> Result<StoredAttachment, StoreError> {
        let (ext, mime_type) = match extension_for_mime(mime_type) {
            Some(ext) => (ext, mime_type.to_string()),
            None => {
                debug!("未识别的 MIME 类型 {}，使用默认类型", mime_type);
                let fallback = extension_for_mime(&self.default_mime).unwrap_or("png");
                (fallback, self.default_mime.clone())
            }
        };

        let key = Uuid::new_v4().to_string();
        let path = self.variant_path(&key, Variant::Original, ext);
        write_new_file(&path, &payload).await?;

        let size = payload.len() as u64;
        self.total_images.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(size, Ordering::Relaxed);

        let thumbnail = self.write_thumbnail(&key, ext, payload).await;

        debug!(key = %key, size, mime_type = %mime_type, "图片已保存");
        Ok(StoredAttachment {
            key,
            mime_type,
            size,
            path,
            thumbnail,
            created_at: Utc::now(),
        })
    }

    /// 按 key 查找图片变体，依次尝试每个已知扩展名
    pub async fn get(&self, key: &str, variant: Variant) -> Option<PathBuf> {
        validate_key(key).ok()?;

        for ext in IMAGE_EXTENSIONS {
            let path = self.variant_path(key, variant, ext);
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }

    /// 获取图片信息
    pub async fn info(&self, key: &str) -> Option<AttachmentInfo> {
        let path = self.get(key, Variant::Original).await?;
        let metadata = fs::metadata(&path).await.ok()?;
        let modified_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();

        Some(AttachmentInfo {
            key: key.to_string(),
            mime_type: mime_for_extension(ext).to_string(),
            size: metadata.len(),
            has_thumbnail: self.get(key, Variant::Thumbnail).await.is_some(),
            path,
            modified_at,
        })
    }

    /// 删除 key 的所有变体，返回实际删除的变体列表
    pub async fn delete(&self, key: &str) -> Result<Vec<Variant>, StoreError> {
        validate_key(key)?;

        let mut removed = Vec::new();
        for variant in Variant::all() {
            let Some(path) = self.get(key, variant).await else {
                continue;
            };
            let size = fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
            match fs::remove_file(&path).await {
                Ok(()) => {
                    if variant == Variant::Original {
                        self.record_removed(1, size);
                    }
                    removed.push(variant);
                }
                // 与清理任务竞争时文件可能已被删除
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    /// 保存表格
    pub async fn put_table(
        &self,
        key: &str,
        payload: &[u8],
        format: TableFormat,
    ) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        let path = self.table_dir.join(format!("{}.{}", key, format.extension()));
        write_new_file(&path, payload).await?;
        Ok(path)
    }

    /// 查找表格，CSV 优先
    pub async fn get_table(&self, key: &str) -> Option<PathBuf> {
        validate_key(key).ok()?;

        for format in TableFormat::all() {
            let path = self.table_dir.join(format!("{}.{}", key, format.extension()));
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }

    /// 当前统计
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            total_images: self.total_images.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            last_cleanup: *self.last_cleanup.lock(),
            image_dir: self.image_dir.clone(),
            table_dir: self.table_dir.clone(),
        }
    }

    /// 扫描图片目录重建统计（不含缩略图）
    pub async fn refresh_stats(&self) -> Result<StoreStats, StoreError> {
        let mut images = 0u64;
        let mut bytes = 0u64;

        let mut entries = fs::read_dir(&self.image_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if is_thumbnail_name(&name.to_string_lossy()) {
                continue;
            }
            match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => {
                    images += 1;
                    bytes += metadata.len();
                }
                Ok(_) => {}
                Err(e) => debug!("读取文件元数据失败: {:?}, 错误: {}", entry.path(), e),
            }
        }

        self.total_images.store(images, Ordering::Relaxed);
        self.total_bytes.store(bytes, Ordering::Relaxed);
        Ok(self.stats())
    }

    pub(super) fn record_removed(&self, images: u64, bytes: u64) {
        let _ = self
            .total_images
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(images))
            });
        let _ = self
            .total_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(bytes))
            });
    }

    fn variant_path(&self, key: &str, variant: Variant, ext: &str) -> PathBuf {
        self.image_dir
            .join(format!("{}{}.{}", key, variant.file_suffix(), ext))
    }

    async fn write_thumbnail(&self, key: &str, ext: &'static str, payload: Vec<u8>) -> Option<PathBuf> {
        let edge = self.thumbnail_edge;
        let rendered =
            tokio::task::spawn_blocking(move || render_thumbnail(&payload, edge, ext)).await;

        let bytes = match rendered {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(key = %key, "生成缩略图失败: {}", e);
                return None;
            }
            Err(e) => {
                warn!(key = %key, "缩略图任务异常退出: {}", e);
                return None;
            }
        };

        let path = self.variant_path(key, Variant::Thumbnail, ext);
        match write_new_file(&path, &bytes).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(key = %key, "写入缩略图失败: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl AttachmentWriter for AttachmentStore {
    async fn put(&self, payload: Vec<u8>, mime_type: &str) -> Result<StoredAttachment, StoreError> {
        AttachmentStore::put(self, payload, mime_type).await
    }

    async fn delete(&self, key: &str) -> Result<Vec<Variant>, StoreError> {
        AttachmentStore::delete(self, key).await
    }
}

pub(super) fn is_thumbnail_name(file_name: &str) -> bool {
    file_name.contains("_thumb.")
}

/// 以 `create_new` 写入新文件，失败时尽力删除残留
async fn write_new_file(path: &Path, payload: &[u8]) -> Result<(), StoreError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let written = async {
        file.write_all(payload).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        let _ = fs::remove_file(path).await;
        return Err(e.into());
    }
    Ok(())
}
