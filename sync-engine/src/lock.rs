//! Mutual exclusion for sync runs.
//!
//! Two independent mechanisms:
//!
//! - [`OngoingSyncs`]: at most one in-flight run per (site, sync identifier).
//!   The in-flight value is a shared future, so every concurrent caller
//!   resolves to the same outcome while the replay logic executes once.
//! - [`SyncBlocks`]: advisory blocks set by UI editing flows ("user is
//!   writing this discussion right now"). The engine only reads them and
//!   fails fast when one is held.

use crate::result::SyncOutcome;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use error_common::SyncError;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Result of one engine run.
pub type RunResult<E> = Result<SyncOutcome<E>, SyncError>;

/// Cloneable handle on an in-flight (or settled) sync run.
pub type OngoingRun<E> = Shared<BoxFuture<'static, RunResult<E>>>;

type SyncKey = (String, String); // (site_id, sync_id)

/// Registry of in-flight sync runs for one engine.
pub struct OngoingSyncs<E: Clone + Send + Sync + 'static> {
    inflight: Arc<DashMap<SyncKey, OngoingRun<E>>>,
}

impl<E: Clone + Send + Sync + 'static> Default for OngoingSyncs<E> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }
}

impl<E: Clone + Send + Sync + 'static> OngoingSyncs<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_syncing(&self, sync_id: &str, site_id: &str) -> bool {
        self.inflight
            .contains_key(&(site_id.to_string(), sync_id.to_string()))
    }

    /// The in-flight run for an identifier, for callers that want to await
    /// instead of duplicating work.
    pub fn ongoing(&self, sync_id: &str, site_id: &str) -> Option<OngoingRun<E>> {
        self.inflight
            .get(&(site_id.to_string(), sync_id.to_string()))
            .map(|entry| entry.clone())
    }

    /// Register `run` as the in-flight operation for an identifier, unless
    /// one is already registered, in which case that one is returned and
    /// `run` is dropped unexecuted.
    ///
    /// Check-and-register is atomic: the map entry is created under the
    /// shard lock, so two racing callers cannot both start a run. The entry
    /// is removed when the run settles, success or failure.
    pub fn begin<F>(&self, sync_id: &str, site_id: &str, run: F) -> OngoingRun<E>
    where
        F: Future<Output = RunResult<E>> + Send + 'static,
    {
        let key = (site_id.to_string(), sync_id.to_string());

        match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(slot) => {
                let inflight = Arc::clone(&self.inflight);

                // Spawned so the run completes even if every caller drops
                // its handle; once started, a run is not abortable.
                let task = tokio::spawn(async move {
                    let result = run.await;
                    inflight.remove(&key);
                    result
                });

                let shared = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(error) => Err(SyncError::Other(format!("sync task failed: {error}"))),
                    }
                }
                .boxed()
                .shared();

                slot.insert(shared.clone());
                shared
            }
        }
    }
}

type BlockKey = (String, String, String); // (site_id, component, sync_id)

/// Advisory blocks keeping sync away from entities the user is editing
/// online. Multiple blockers can hold the same identifier (e.g. two open
/// views); it stays blocked until all of them release.
#[derive(Default)]
pub struct SyncBlocks {
    blocked: DashMap<BlockKey, HashSet<String>>,
}

impl SyncBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blocked(&self, component: &str, sync_id: &str, site_id: &str) -> bool {
        self.blocked
            .get(&Self::key(component, sync_id, site_id))
            .map(|blockers| !blockers.is_empty())
            .unwrap_or(false)
    }

    pub fn block_operation(
        &self,
        component: &str,
        sync_id: &str,
        site_id: &str,
        blocker: Option<&str>,
    ) {
        self.blocked
            .entry(Self::key(component, sync_id, site_id))
            .or_default()
            .insert(blocker.unwrap_or("").to_string());
    }

    pub fn unblock_operation(
        &self,
        component: &str,
        sync_id: &str,
        site_id: &str,
        blocker: Option<&str>,
    ) {
        let key = Self::key(component, sync_id, site_id);
        if let Some(mut blockers) = self.blocked.get_mut(&key) {
            blockers.remove(blocker.unwrap_or(""));
            if blockers.is_empty() {
                drop(blockers);
                self.blocked.remove_if(&key, |_, blockers| blockers.is_empty());
            }
        }
    }

    /// Drop every block of a site, e.g. when the user logs out of it.
    pub fn clear_blocks(&self, site_id: &str) {
        self.blocked.retain(|key, _| key.0 != site_id);
    }

    fn key(component: &str, sync_id: &str, site_id: &str) -> BlockKey {
        (
            site_id.to_string(),
            component.to_string(),
            sync_id.to_string(),
        )
    }
}
