use async_trait::async_trait;
use error_common::SyncResult;

/// Per (site, sync identifier) bookkeeping of the last sync attempt.
///
/// Timestamps are recorded for every attempt, successful or not, and drive
/// the "sync if needed" throttling. Warnings from batch syncs are stashed
/// here too so the UI can show them the next time the activity is opened.
///
/// Writes are best-effort from the engine's point of view: a failed
/// timestamp update must never fail the sync itself.
#[async_trait]
pub trait SyncTimeStore: Send + Sync {
    async fn last_sync_time(&self, sync_id: &str, site_id: &str) -> SyncResult<Option<i64>>;

    async fn set_sync_time(&self, sync_id: &str, site_id: &str, timestamp: i64) -> SyncResult<()>;

    async fn set_sync_warnings(
        &self,
        sync_id: &str,
        site_id: &str,
        warnings: &[String],
    ) -> SyncResult<()>;

    async fn sync_warnings(&self, sync_id: &str, site_id: &str) -> SyncResult<Vec<String>>;
}
