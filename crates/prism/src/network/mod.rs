//! 网络模块
//!
//! 提供上游请求的超时与取消控制

mod timeout;

pub use timeout::*;

#[cfg(test)]
mod tests;
