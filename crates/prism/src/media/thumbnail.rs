//! 缩略图生成
//!
//! 等比缩放到边界框内（不放大），按原扩展名重新编码

use image::{DynamicImage, ImageFormat, ImageOutputFormat};
use std::io::Cursor;
use thiserror::Error;

/// 缩略图默认边界框边长
pub const DEFAULT_THUMBNAIL_EDGE: u32 = 200;

/// 缩略图生成错误
#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("Unsupported thumbnail format: {0}")]
    UnsupportedFormat(String),
}

/// 生成缩略图并编码为 `ext` 对应的格式
///
/// CPU 密集，异步上下文中应通过 `spawn_blocking` 调用
pub fn render_thumbnail(payload: &[u8], max_edge: u32, ext: &str) -> Result<Vec<u8>, ThumbnailError> {
    let format = ImageFormat::from_extension(ext)
        .ok_or_else(|| ThumbnailError::UnsupportedFormat(ext.to_string()))?;

    let source = image::load_from_memory(payload)?;
    let resized = if source.width() <= max_edge && source.height() <= max_edge {
        source
    } else {
        source.thumbnail(max_edge, max_edge)
    };

    // JPEG 编码器不接受 alpha 通道
    let encodable = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
        _ => resized,
    };

    let mut out = Vec::new();
    encodable.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::from(format))?;
    Ok(out)
}

/// 读取图片尺寸，无法解码时返回 `None`
pub fn image_dimensions(payload: &[u8]) -> Option<(u32, u32)> {
    image::load_from_memory(payload)
        .ok()
        .map(|img| (img.width(), img.height()))
}
