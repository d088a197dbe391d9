//! 附件存储模块
//!
//! 基于文件系统的内容寻址 blob 存储，分为两个逻辑桶：
//! - `images/` - 生成的图片 `{key}.{ext}` 及缩略图 `{key}_thumb.{ext}`
//! - `tables/` - 表格 `{key}.csv` / `{key}.xlsx`
//!
//! 唯一的淘汰机制是按修改时间的定期清理（见 `sweep`）

mod disk;
mod sweep;
mod types;

pub use disk::*;
pub use sweep::*;
pub use types::*;

use async_trait::async_trait;

use crate::media::Variant;

/// 附件写入接口
///
/// 编排器只依赖这个接口，测试中可以替换为带延迟或失败注入的实现
#[async_trait]
pub trait AttachmentWriter: Send + Sync {
    /// 持久化一个附件，返回其唯一 key 及元数据
    async fn put(&self, payload: Vec<u8>, mime_type: &str) -> Result<StoredAttachment, StoreError>;

    /// 删除 key 对应的全部变体，返回实际删除的变体
    async fn delete(&self, key: &str) -> Result<Vec<Variant>, StoreError>;
}

#[cfg(test)]
mod tests;
