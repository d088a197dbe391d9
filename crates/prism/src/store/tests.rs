//! 附件存储测试

use super::*;
use crate::media::Variant;
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb};
use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> AttachmentStore {
    AttachmentStore::open(StoreOptions::with_root(dir.path()))
        .await
        .unwrap()
}

fn encode(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([200u8, 100, 50]));
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), format)
        .unwrap();
    out
}

fn set_age(path: &Path, age: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

#[tokio::test]
async fn test_open_creates_buckets() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    assert!(dir.path().join("images").is_dir());
    assert!(dir.path().join("tables").is_dir());
    assert_eq!(store.stats().total_images, 0);
    assert!(store.stats().last_cleanup.is_none());
}

#[tokio::test]
async fn test_put_jpeg_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let payload = encode(640, 320, ImageOutputFormat::Jpeg(90));

    let stored = store.put(payload.clone(), "image/jpeg").await.unwrap();
    assert_eq!(stored.mime_type, "image/jpeg");
    assert_eq!(stored.size, payload.len() as u64);
    assert!(stored.path.to_string_lossy().ends_with(".jpg"));

    let original = store.get(&stored.key, Variant::Original).await.unwrap();
    assert_eq!(original, stored.path);
    assert_eq!(std::fs::read(&original).unwrap(), payload);

    let thumb = store.get(&stored.key, Variant::Thumbnail).await.unwrap();
    assert!(thumb.to_string_lossy().ends_with("_thumb.jpg"));
    let thumb_bytes = std::fs::read(&thumb).unwrap();
    assert_eq!(
        crate::media::image_dimensions(&thumb_bytes),
        Some((200, 100))
    );
}

#[tokio::test]
async fn test_put_assigns_distinct_keys() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let a = store.put(b"same".to_vec(), "image/png").await.unwrap();
    let b = store.put(b"same".to_vec(), "image/png").await.unwrap();
    assert_ne!(a.key, b.key);
    assert_eq!(store.stats().total_images, 2);
}

#[tokio::test]
async fn test_unknown_mime_uses_default_extension() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let stored = store
        .put(b"opaque bytes".to_vec(), "application/x-unknown")
        .await
        .unwrap();
    assert_eq!(stored.mime_type, "image/png");
    assert!(stored.path.to_string_lossy().ends_with(".png"));
    // 无法解码，缩略图生成失败但不影响原图
    assert!(stored.thumbnail.is_none());
    assert!(store.get(&stored.key, Variant::Original).await.is_some());
}

#[tokio::test]
async fn test_info_reports_metadata() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let payload = encode(20, 20, ImageOutputFormat::Png);

    let stored = store.put(payload.clone(), "image/png").await.unwrap();
    let info = store.info(&stored.key).await.unwrap();
    assert_eq!(info.mime_type, "image/png");
    assert_eq!(info.size, payload.len() as u64);
    assert!(info.has_thumbnail);

    assert!(store.info("missing-key").await.is_none());
}

#[tokio::test]
async fn test_delete_removes_all_variants() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let stored = store
        .put(encode(300, 300, ImageOutputFormat::Png), "image/png")
        .await
        .unwrap();

    let removed = store.delete(&stored.key).await.unwrap();
    assert_eq!(removed, vec![Variant::Original, Variant::Thumbnail]);
    assert!(store.get(&stored.key, Variant::Original).await.is_none());
    assert!(store.get(&stored.key, Variant::Thumbnail).await.is_none());
    assert_eq!(store.stats().total_images, 0);
    assert_eq!(store.stats().total_bytes, 0);

    // 再次删除不报错
    assert!(store.delete(&stored.key).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejects_path_like_keys() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    assert!(store.get("../secret", Variant::Original).await.is_none());
    assert!(store.get_table("a/b").await.is_none());
    assert!(matches!(
        store.delete("..").await,
        Err(StoreError::InvalidKey(_))
    ));
    assert!(matches!(
        store.put_table("x.y", b"", TableFormat::Csv).await,
        Err(StoreError::InvalidKey(_))
    ));
}

#[test]
fn test_validate_key() {
    assert!(validate_key("0b8f3c2e-1d2a-4c5b-9e8f-123456789abc").is_ok());
    assert!(validate_key("table_01").is_ok());
    assert!(validate_key("").is_err());
    assert!(validate_key("a.b").is_err());
    assert!(validate_key(&"k".repeat(129)).is_err());
    assert!(validate_key("0b8f3c2e_thumb").is_err());
}

#[tokio::test]
async fn test_thumbnail_file_is_not_addressable_as_a_key() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let stored = store
        .put(encode(300, 300, ImageOutputFormat::Png), "image/png")
        .await
        .unwrap();
    let alias = format!("{}_thumb", stored.key);

    assert!(store.get(&alias, Variant::Original).await.is_none());
    assert!(store.info(&alias).await.is_none());
    assert!(matches!(
        store.delete(&alias).await,
        Err(StoreError::InvalidKey(_))
    ));

    // 原附件的缩略图与统计都不受影响
    assert!(store.get(&stored.key, Variant::Thumbnail).await.is_some());
    assert_eq!(store.stats().total_images, 1);
    assert_eq!(store.stats().total_bytes, stored.size);
}

#[tokio::test]
async fn test_table_bucket() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let path = store
        .put_table("report", b"a,b\n1,2\n", TableFormat::Csv)
        .await
        .unwrap();
    assert!(path.starts_with(store.table_dir()));
    assert_eq!(store.get_table("report").await, Some(path));
    assert!(store.get_table("other").await.is_none());

    // 已存在的 key 不会被覆盖
    let err = store
        .put_table("report", b"x", TableFormat::Csv)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));

    // 表格不计入图片统计
    assert_eq!(store.stats().total_images, 0);
}

#[tokio::test]
async fn test_stats_exclude_thumbnails_and_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let payload = encode(400, 400, ImageOutputFormat::Png);
    {
        let store = open_store(&dir).await;
        let stored = store.put(payload.clone(), "image/png").await.unwrap();
        assert!(stored.thumbnail.is_some());

        let stats = store.stats();
        assert_eq!(stats.total_images, 1);
        assert_eq!(stats.total_bytes, payload.len() as u64);
    }

    let reopened = open_store(&dir).await;
    assert_eq!(reopened.stats().total_images, 1);
    assert_eq!(reopened.stats().total_bytes, payload.len() as u64);
}

#[tokio::test]
async fn test_sweep_removes_only_expired_files() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let old = store.put(vec![1u8; 64], "image/png").await.unwrap();
    let fresh = store.put(vec![2u8; 32], "image/png").await.unwrap();
    let table = store
        .put_table("old-table", b"a,b\n", TableFormat::Csv)
        .await
        .unwrap();

    set_age(&old.path, Duration::from_secs(90 * 60));
    set_age(&fresh.path, Duration::from_secs(30 * 60));
    set_age(&table, Duration::from_secs(3 * 3600));

    let report = store.sweep(1).await.unwrap();
    assert_eq!(report.deleted_count, 2);
    assert_eq!(report.freed_bytes, 64 + 4);
    assert!(report.deleted_files.iter().any(|f| f.starts_with(&old.key)));
    assert!(report.deleted_files.contains(&"old-table.csv".to_string()));

    assert!(store.get(&old.key, Variant::Original).await.is_none());
    assert!(store.get(&fresh.key, Variant::Original).await.is_some());
    assert!(store.get_table("old-table").await.is_none());

    let stats = store.stats();
    assert_eq!(stats.total_images, 1);
    assert_eq!(stats.total_bytes, 32);
    assert!(stats.last_cleanup.is_some());
}

#[tokio::test]
async fn test_sweep_with_huge_age_keeps_everything() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let stored = store.put(vec![3u8; 16], "image/png").await.unwrap();
    set_age(&stored.path, Duration::from_secs(2 * 3600));

    for hours in [u64::MAX / 3600 + 1, u64::MAX] {
        let report = store.sweep(hours).await.unwrap();
        assert_eq!(report.deleted_count, 0);
    }
    assert!(store.get(&stored.key, Variant::Original).await.is_some());
}

#[tokio::test]
async fn test_sweep_on_empty_store() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let report = store.sweep_older_than(Duration::ZERO).await.unwrap();
    assert_eq!(report, SweepReport::default());
    assert!(store.stats().last_cleanup.is_some());
}

#[tokio::test]
async fn test_writer_trait_delegates_to_store() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let writer: &dyn AttachmentWriter = &store;

    let stored = writer.put(b"bytes".to_vec(), "image/gif").await.unwrap();
    assert!(stored.path.to_string_lossy().ends_with(".gif"));
    assert_eq!(
        writer.delete(&stored.key).await.unwrap(),
        vec![Variant::Original]
    );
}
