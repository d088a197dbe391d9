//! 媒体处理模块
//!
//! 提供图片 MIME 映射、类型检测和缩略图生成

mod mime;
mod thumbnail;

pub use mime::*;
pub use thumbnail::*;

/// 附件变体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Original,
    #[serde(alias = "thumb")]
    Thumbnail,
}

impl Variant {
    /// 文件名中 key 之后的后缀
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Variant::Original => "",
            Variant::Thumbnail => "_thumb",
        }
    }

    pub fn all() -> [Variant; 2] {
        [Variant::Original, Variant::Thumbnail]
    }
}

impl Default for Variant {
    fn default() -> Self {
        Variant::Original
    }
}
