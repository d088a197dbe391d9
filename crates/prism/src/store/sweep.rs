//! 过期附件清理

use chrono::Utc;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, warn};

use super::disk::{is_thumbnail_name, AttachmentStore};
use super::types::{StoreError, SweepReport};

const SECS_PER_HOUR: u64 = 3600;

impl AttachmentStore {
    /// 删除修改时间早于 `max_age_hours` 小时的所有文件
    ///
    /// 过大的小时数按饱和处理，等价于不删除任何文件
    pub async fn sweep(&self, max_age_hours: u64) -> Result<SweepReport, StoreError> {
        let max_age = Duration::from_secs(max_age_hours.saturating_mul(SECS_PER_HOUR));
        self.sweep_older_than(max_age).await
    }

    /// 删除修改时间早于 `max_age` 的所有文件（图片、缩略图与表格）
    ///
    /// 单个文件删除失败不会中断清理；与并发删除竞争导致的 NotFound 直接跳过
    pub async fn sweep_older_than(&self, max_age: Duration) -> Result<SweepReport, StoreError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut report = SweepReport::default();
        sweep_dir(self.image_dir(), cutoff, &mut report).await?;
        sweep_dir(self.table_dir(), cutoff, &mut report).await?;

        *self.last_cleanup.lock() = Some(Utc::now());
        self.refresh_stats().await?;

        if report.deleted_count > 0 {
            info!(
                deleted = report.deleted_count,
                freed_bytes = report.freed_bytes,
                "清理了 {} 个过期文件",
                report.deleted_count
            );
        } else {
            debug!("没有需要清理的过期文件");
        }
        Ok(report)
    }
}

async fn sweep_dir(dir: &Path, cutoff: SystemTime, report: &mut SweepReport) -> Result<(), StoreError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!("读取文件元数据失败: {:?}, 错误: {}", path, e);
                report.skipped += 1;
                continue;
            }
        };

        let Ok(modified) = metadata.modified() else {
            report.skipped += 1;
            continue;
        };
        if modified >= cutoff {
            continue;
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                debug!(thumbnail = is_thumbnail_name(&name), "已删除过期文件: {}", name);
                report.deleted_count += 1;
                report.freed_bytes += metadata.len();
                report.deleted_files.push(name);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                report.skipped += 1;
            }
            Err(e) => {
                warn!("删除过期文件失败: {:?}, 错误: {}", path, e);
                report.skipped += 1;
            }
        }
    }
    Ok(())
}
