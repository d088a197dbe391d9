//! 后台任务模块
//!
//! 跟踪会话内的附件持久化操作，在发出完成事件前等待它们全部结束
//!
//! # 模块结构
//! - `tracker` - 持久化操作跟踪器

pub mod tracker;

// Re-exports
pub use tracker::*;
