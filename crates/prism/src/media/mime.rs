//! MIME 类型映射
//!
//! 图片 MIME 类型与文件扩展名互转，以及基于文件头 magic bytes 的类型检测

/// 未识别 MIME 类型时使用的默认类型
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// 存储支持的图片扩展名（按查找顺序）
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "gif", "webp"];

/// 根据 MIME 类型获取文件扩展名（不含点）
///
/// 未识别的类型返回 `None`，由调用方决定回退策略
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let normalized = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match normalized.as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// 从文件扩展名推断 MIME 类型
pub fn mime_for_extension(ext: &str) -> &'static str {
    let normalized = ext.to_ascii_lowercase().replace('.', "");

    match normalized.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "csv" => "text/csv",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// 基于文件头 magic bytes 检测图片 MIME 类型
pub fn sniff_image_mime(buffer: &[u8]) -> Option<&'static str> {
    // PNG: 89 50 4E 47
    if buffer.len() >= 8 && buffer.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png");
    }

    // JPEG: FF D8 FF
    if buffer.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }

    // GIF: 47 49 46
    if buffer.len() >= 6 && buffer.starts_with(b"GIF") {
        return Some("image/gif");
    }

    // WebP: RIFF .... WEBP
    if buffer.len() >= 12 && buffer.starts_with(b"RIFF") && &buffer[8..12] == b"WEBP" {
        return Some("image/webp");
    }

    None
}
