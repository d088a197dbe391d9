//! 附件缓存路由

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use prism::media::{mime_for_extension, Variant};
use prism::store::AttachmentInfo;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::path::Path as FsPath;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

const IMAGE_CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    #[serde(default)]
    pub size: Option<Variant>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupBody {
    #[serde(default)]
    pub max_age_hours: Option<u64>,
}

fn mime_of(path: &FsPath) -> &'static str {
    mime_for_extension(path.extension().and_then(|e| e.to_str()).unwrap_or_default())
}

async fn read_file(path: &FsPath, key: &str, missing: &str) -> Result<Vec<u8>, ApiError> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        // 与清理任务竞争
        ErrorKind::NotFound => ApiError::key_not_found(missing, key),
        _ => ApiError::Internal(e.to_string()),
    })
}

/// 获取图片；缩略图不存在时返回原图
pub async fn get_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ImageQuery>,
) -> Result<Response, ApiError> {
    let variant = query.size.unwrap_or_default();

    let mut path = state.store.get(&key, variant).await;
    if path.is_none() && variant == Variant::Thumbnail {
        path = state.store.get(&key, Variant::Original).await;
    }
    let path = path.ok_or_else(|| ApiError::key_not_found("Image not found", &key))?;

    let bytes = read_file(&path, &key, "Image not found").await?;
    Ok((
        [(CONTENT_TYPE, mime_of(&path)), (CACHE_CONTROL, IMAGE_CACHE_CONTROL)],
        bytes,
    )
        .into_response())
}

/// 删除图片及其缩略图
pub async fn delete_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state.store.delete(&key).await?;
    if deleted.is_empty() {
        return Err(ApiError::key_not_found("Image not found", &key));
    }

    info!(key = %key, variants = deleted.len(), "image deleted");
    Ok(Json(json!({
        "success": true,
        "key": key,
        "deleted": deleted,
    })))
}

/// 图片信息
pub async fn image_info(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<AttachmentInfo>, ApiError> {
    state
        .store
        .info(&key)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::key_not_found("Image not found in cache", &key))
}

/// 获取表格，XLSX 作为附件下载
pub async fn get_table(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let path = state
        .store
        .get_table(&key)
        .await
        .ok_or_else(|| ApiError::key_not_found("Table not found", &key))?;
    let bytes = read_file(&path, &key, "Table not found").await?;

    let is_xlsx = path.extension().and_then(|e| e.to_str()) == Some("xlsx");
    if is_xlsx {
        let disposition = format!("attachment; filename=\"{}.xlsx\"", key);
        Ok((
            [
                (CONTENT_TYPE, mime_of(&path).to_string()),
                (CONTENT_DISPOSITION, disposition),
            ],
            bytes,
        )
            .into_response())
    } else {
        Ok(([(CONTENT_TYPE, "text/csv; charset=utf-8")], bytes).into_response())
    }
}

/// 按需清理；请求体可省略，默认使用配置的保留时间
pub async fn cleanup(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let request: CleanupBody = if body.iter().all(u8::is_ascii_whitespace) {
        CleanupBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid cleanup request: {}", e)))?
    };
    let max_age_hours = request
        .max_age_hours
        .unwrap_or(state.config.retention.max_age_hours);

    let report = state.store.sweep(max_age_hours).await?;
    info!(
        deleted = report.deleted_count,
        freed_bytes = report.freed_bytes,
        max_age_hours,
        "manual cache cleanup"
    );

    Ok(Json(json!({
        "success": true,
        "message": "Cache cleanup completed",
        "deletedFiles": report.deleted_count,
        "freedSpace": report.freed_bytes,
        "files": report.deleted_files,
    })))
}
