//! Interfaces of the services the engine depends on but does not own.
//!
//! All of them are injected, never ambient, so tests can instantiate
//! isolated instances per case.

use async_trait::async_trait;
use error_common::SyncResult;
use std::sync::atomic::{AtomicBool, Ordering};

/// Network reachability, as reported by the platform layer.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Shared connectivity flag flipped by the platform's network callbacks.
#[derive(Debug)]
pub struct NetworkStatus {
    online: AtomicBool,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for NetworkStatus {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Account/site registry. Sync identifiers and stored data are scoped by
/// site so multi-account installs don't mix state.
pub trait Sites: Send + Sync {
    fn current_site_id(&self) -> String;

    /// User logged into the current site
    fn current_user_id(&self) -> i64;

    /// Every configured site, for "sync all sites" batches
    fn site_ids(&self) -> Vec<String>;
}

/// Single-account registry; covers tests and installs with one site.
#[derive(Debug, Clone)]
pub struct SingleSite {
    pub site_id: String,
    pub user_id: i64,
}

impl SingleSite {
    pub fn new(site_id: &str, user_id: i64) -> Self {
        Self {
            site_id: site_id.to_string(),
            user_id,
        }
    }
}

impl Sites for SingleSite {
    fn current_site_id(&self) -> String {
        self.site_id.clone()
    }

    fn current_user_id(&self) -> i64 {
        self.user_id
    }

    fn site_ids(&self) -> Vec<String> {
        vec![self.site_id.clone()]
    }
}

/// Refreshes cached server data after a successful sync so the UI sees the
/// post-sync state. Opaque to the engine; failures are ignored (a stale
/// cache is not a sync failure).
#[async_trait]
pub trait Prefetcher: Send + Sync {
    async fn prefetch_after_update(
        &self,
        component: &str,
        entity_id: i64,
        course_id: i64,
        site_id: &str,
    ) -> SyncResult<()>;
}

/// Replays interaction logs (views, attempts opened) recorded while
/// offline. Log replay is bookkeeping: it runs before the pending actions
/// and a failure never aborts the run.
#[async_trait]
pub trait LogReplay: Send + Sync {
    async fn sync_activity_logs(
        &self,
        component: &str,
        entity_id: i64,
        site_id: &str,
    ) -> SyncResult<()>;
}

/// Log replay for contexts that don't record offline logs.
pub struct NoopLogReplay;

#[async_trait]
impl LogReplay for NoopLogReplay {
    async fn sync_activity_logs(
        &self,
        _component: &str,
        _entity_id: i64,
        _site_id: &str,
    ) -> SyncResult<()> {
        Ok(())
    }
}

/// Prefetcher for contexts without a download layer.
pub struct NoopPrefetcher;

#[async_trait]
impl Prefetcher for NoopPrefetcher {
    async fn prefetch_after_update(
        &self,
        _component: &str,
        _entity_id: i64,
        _course_id: i64,
        _site_id: &str,
    ) -> SyncResult<()> {
        Ok(())
    }
}
