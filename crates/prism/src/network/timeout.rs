//! 网络超时和取消控制
//!
//! 上游请求的超时覆盖整个传输过程，而不是整个会话

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// 超时配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// 连接超时（毫秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,
    /// 单个上游请求的总超时（毫秒），包含完整的流式传输
    #[serde(default = "default_request_timeout")]
    pub request_ms: u64,
}

fn default_connect_timeout() -> u64 {
    DEFAULT_TIMEOUTS.connect_ms
}
fn default_request_timeout() -> u64 {
    DEFAULT_TIMEOUTS.request_ms
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        DEFAULT_TIMEOUTS
    }
}

/// 默认超时配置
pub const DEFAULT_TIMEOUTS: TimeoutConfig = TimeoutConfig {
    connect_ms: 30000,  // 30秒
    request_ms: 300000, // 5分钟
};

impl TimeoutConfig {
    /// 连接超时 Duration
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    /// 请求超时 Duration
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

/// 在限定时间内未完成
#[derive(Debug, Error)]
#[error("Request timed out after {timeout_ms}ms")]
pub struct TimeoutError {
    pub timeout_ms: u64,
}

/// 消费端已断开，操作被取消
#[derive(Debug, Error)]
#[error("Request cancelled")]
pub struct AbortError;

#[derive(Debug, Error)]
pub enum TimeoutOrAbortError {
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error(transparent)]
    Abort(#[from] AbortError),
}

/// 带超时执行异步操作
pub async fn with_timeout<T, F>(future: F, timeout_ms: u64) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(Duration::from_millis(timeout_ms), future)
        .await
        .map_err(|_| TimeoutError { timeout_ms })
}

/// 带超时和取消执行异步操作
///
/// 取消或超时时 `future` 被丢弃，其持有的连接随之释放
pub async fn with_timeout_and_cancel<T, F>(
    future: F,
    timeout_ms: u64,
    cancel_token: &CancellationToken,
) -> Result<T, TimeoutOrAbortError>
where
    F: Future<Output = T>,
{
    match cancel_token
        .run_until_cancelled(with_timeout(future, timeout_ms))
        .await
    {
        Some(result) => Ok(result?),
        None => Err(AbortError.into()),
    }
}
