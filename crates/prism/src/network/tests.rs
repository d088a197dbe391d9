//! 网络模块测试

use super::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[test]
fn test_timeout_config_default() {
    let config = TimeoutConfig::default();
    assert_eq!(config.connect_ms, 30000);
    assert_eq!(config.request_ms, 300000);
    assert_eq!(config.request(), Duration::from_secs(300));
}

#[test]
fn test_timeout_config_partial_deserialize() {
    let config: TimeoutConfig = serde_json::from_str(r#"{"request_ms": 1000}"#).unwrap();
    assert_eq!(config.connect_ms, 30000);
    assert_eq!(config.request_ms, 1000);
}

#[test]
fn test_timeout_error_display() {
    let err = TimeoutError { timeout_ms: 5000 };
    assert_eq!(err.to_string(), "Request timed out after 5000ms");
}

#[tokio::test]
async fn test_with_timeout_success() {
    let result = with_timeout(async { 42 }, 1000).await;
    assert_eq!(result.unwrap(), 42);
}

#[tokio::test]
async fn test_with_timeout_timeout() {
    let result = with_timeout(
        async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            42
        },
        10,
    )
    .await;
    assert_eq!(result.unwrap_err().timeout_ms, 10);
}

#[tokio::test]
async fn test_with_timeout_and_cancel_cancelled() {
    let token = CancellationToken::new();
    token.cancel();

    let result = with_timeout_and_cancel(
        async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        },
        60000,
        &token,
    )
    .await;
    assert!(matches!(result, Err(TimeoutOrAbortError::Abort(_))));
}

#[tokio::test]
async fn test_with_timeout_and_cancel_completes() {
    let token = CancellationToken::new();
    let result = with_timeout_and_cancel(async { "done" }, 1000, &token).await;
    assert_eq!(result.unwrap(), "done");
}

#[tokio::test]
async fn test_with_timeout_and_cancel_times_out() {
    let token = CancellationToken::new();
    let result = with_timeout_and_cancel(
        async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        },
        20,
        &token,
    )
    .await;
    assert!(matches!(
        result,
        Err(TimeoutOrAbortError::Timeout(TimeoutError { timeout_ms: 20 }))
    ));
}
