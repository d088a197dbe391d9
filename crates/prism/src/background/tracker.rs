//! 持久化操作跟踪器
//!
//! 每个会话一个跟踪器。检测到附件的瞬间即登记操作（在写入开始之前），
//! 会话结束时 `await_all` 等待所有已登记操作结束（成功、失败或 panic）

use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// 跟踪器计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStats {
    /// 已登记的操作数
    pub tracked: usize,
    /// 已结束的操作数（含失败）
    pub settled: usize,
    /// 失败或 panic 的操作数
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    tracked: AtomicUsize,
    settled: AtomicUsize,
    failed: AtomicUsize,
}

/// 在操作结束时计数，panic 展开时同样生效
struct SettleGuard {
    counters: Arc<Counters>,
    succeeded: bool,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if !self.succeeded {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.settled.fetch_add(1, Ordering::Release);
    }
}

/// 持久化操作跟踪器
#[derive(Debug, Clone, Default)]
pub struct PersistenceTracker {
    tasks: TaskTracker,
    counters: Arc<Counters>,
}

impl PersistenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记并立即启动一个操作
    ///
    /// 登记发生在本调用返回之前，因此操作不可能在被跟踪之前完成
    pub fn track<F, T, E>(&self, operation: F) -> JoinHandle<Result<T, E>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.counters.tracked.fetch_add(1, Ordering::Relaxed);
        let counters = Arc::clone(&self.counters);

        self.tasks.spawn(async move {
            let mut guard = SettleGuard {
                counters,
                succeeded: false,
            };
            let result = operation.await;
            match &result {
                Ok(_) => guard.succeeded = true,
                Err(e) => debug!("持久化操作失败: {}", e),
            }
            result
        })
    }

    /// 等待所有已登记操作结束
    ///
    /// 调用后跟踪器视为关闭；会话在所有上游任务结束后才调用
    pub async fn await_all(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        debug!(
            settled = self.counters.settled.load(Ordering::Acquire),
            "所有持久化操作已结束"
        );
    }

    /// 尚未结束的操作数
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            tracked: self.counters.tracked.load(Ordering::Relaxed),
            settled: self.counters.settled.load(Ordering::Acquire),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[tokio::test]
    async fn test_await_all_with_nothing_tracked() {
        let tracker = PersistenceTracker::new();
        tracker.await_all().await;
        assert_eq!(tracker.pending(), 0);
        assert_eq!(tracker.stats(), TrackerStats::default());
    }

    #[tokio::test]
    async fn test_await_all_waits_for_slow_operation() {
        let tracker = PersistenceTracker::new();
        let done = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&done);
        tracker.track(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, String>(())
        });
        assert_eq!(tracker.pending(), 1);

        tracker.await_all().await;
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn test_failures_and_panics_still_settle() {
        let tracker = PersistenceTracker::new();

        tracker.track(async { Ok::<u8, String>(1) });
        tracker.track(async { Err::<u8, String>("disk full".to_string()) });
        let panicked = tracker.track(async {
            if true {
                panic!("encoder crashed");
            }
            Ok::<u8, String>(0)
        });

        tracker.await_all().await;
        assert!(panicked.await.unwrap_err().is_panic());

        let stats = tracker.stats();
        assert_eq!(stats.tracked, 3);
        assert_eq!(stats.settled, 3);
        assert_eq!(stats.failed, 2);
    }

    #[tokio::test]
    async fn test_track_returns_operation_result() {
        let tracker = PersistenceTracker::new();
        let handle = tracker.track(async { Ok::<_, String>("key-1".to_string()) });
        assert_eq!(handle.await.unwrap().unwrap(), "key-1");
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let tracker = PersistenceTracker::new();
        let clone = tracker.clone();

        clone.track(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, String>(())
        });
        tracker.await_all().await;
        assert_eq!(clone.stats().settled, 1);
    }
}
