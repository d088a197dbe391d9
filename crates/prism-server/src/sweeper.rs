//! 定期清理任务
//!
//! 按配置的间隔清理存储中超过保留时间的文件。首次清理在一个间隔之后执行

use prism::config::RetentionConfig;
use prism::AttachmentStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 启动清理任务；未启用保留策略时返回 `None`
pub fn spawn(
    store: Arc<AttachmentStore>,
    retention: &RetentionConfig,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if !retention.enabled {
        info!("cache retention disabled, sweeper not started");
        return None;
    }

    let period = Duration::from_secs(retention.sweep_interval_secs.max(1));
    let max_age_hours = retention.max_age_hours;
    info!(
        interval_secs = period.as_secs(),
        max_age_hours, "cache sweeper started"
    );

    Some(tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("cache sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match store.sweep(max_age_hours).await {
                        Ok(report) if report.deleted_count > 0 => info!(
                            deleted = report.deleted_count,
                            freed_bytes = report.freed_bytes,
                            "cache sweep finished"
                        ),
                        Ok(_) => debug!("cache sweep found nothing to delete"),
                        Err(e) => warn!(error = %e, "cache sweep failed"),
                    }
                }
            }
        }
    }))
}
