//! The per-activity sync engine template.
//!
//! Control flow of one entity run, mirroring the protocol every activity
//! type shares:
//!
//! 1. Resolve site and user, compute the sync identifier.
//! 2. If a run is in flight for the identifier, await that one.
//! 3. If the identifier is blocked (user editing online), fail fast.
//! 4. Register the run atomically, then: replay offline logs (best-effort),
//!    load pending actions, bail out when offline, reconcile, replay
//!    sequentially, invalidate caches, record the sync time.

use crate::collaborators::{Connectivity, Prefetcher, Sites};
use crate::config::SyncConfig;
use crate::handler::{ActivityHandler, SyncScope};
use crate::lock::{OngoingSyncs, RunResult, SyncBlocks};
use crate::result::{CreatedItem, SyncOutcome};
use chrono::Utc;
use error_common::SyncError;
use events_bus::{Event, EventBus};
use offline_store::SyncTimeStore;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

/// Cross-cutting services shared by every engine instance in the process.
#[derive(Clone)]
pub struct SyncServices {
    pub blocks: Arc<SyncBlocks>,
    pub times: Arc<dyn SyncTimeStore>,
    pub connectivity: Arc<dyn Connectivity>,
    pub sites: Arc<dyn Sites>,
    pub prefetcher: Arc<dyn Prefetcher>,
    pub bus: EventBus,
    pub config: SyncConfig,
}

/// Sync engine for one activity type.
pub struct SyncEngine<H: ActivityHandler> {
    handler: Arc<H>,
    services: SyncServices,
    ongoing: OngoingSyncs<H::Extra>,
}

impl<H: ActivityHandler> SyncEngine<H> {
    pub fn new(handler: H, services: SyncServices) -> Self {
        Self {
            handler: Arc::new(handler),
            services,
            ongoing: OngoingSyncs::new(),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Topic this engine's batch syncs announce results on.
    pub fn auto_synced_topic(&self) -> String {
        format!("{}.auto_synced", self.handler.component())
    }

    pub fn is_syncing(&self, scope: &SyncScope, site_id: &str) -> bool {
        self.ongoing
            .is_syncing(&self.handler.sync_identifier(scope), site_id)
    }

    /// Whether the scope has queued offline data.
    pub async fn has_data_to_sync(&self, scope: &SyncScope, site_id: &str) -> bool {
        self.handler
            .load_pending(scope, site_id)
            .await
            .map(|pending| !pending.is_empty())
            .unwrap_or(false)
    }

    /// Whether enough time has passed since the identifier's last attempt.
    pub async fn is_sync_needed(&self, sync_id: &str, site_id: &str) -> bool {
        match self.services.times.last_sync_time(sync_id, site_id).await {
            Ok(Some(last)) => {
                Utc::now().timestamp() - last >= self.services.config.sync_interval_secs
            }
            // Never synced, or the bookkeeping read failed: sync.
            Ok(None) | Err(_) => true,
        }
    }

    /// Synchronize one entity.
    ///
    /// Concurrent calls for the same (site, identifier) all resolve to the
    /// same outcome; the replay executes once.
    ///
    /// # Errors
    ///
    /// `Connectivity` when offline with actions queued, `Blocked` when the
    /// identifier is held by a UI editing flow. Both are retryable; local
    /// data is untouched.
    pub async fn sync_entity(
        &self,
        scope: SyncScope,
        site_id: Option<&str>,
    ) -> RunResult<H::Extra> {
        let (scope, site_id) = self.resolve(scope, site_id);
        let sync_id = self.handler.sync_identifier(&scope);

        if let Some(ongoing) = self.ongoing.ongoing(&sync_id, &site_id) {
            tracing::debug!(
                component = self.handler.component(),
                sync_id = %sync_id,
                "sync already in progress, returning ongoing run"
            );
            return ongoing.await;
        }

        if self
            .services
            .blocks
            .is_blocked(self.handler.component(), &sync_id, &site_id)
        {
            tracing::debug!(
                component = self.handler.component(),
                sync_id = %sync_id,
                "cannot sync, operation is blocked"
            );
            return Err(SyncError::Blocked {
                activity: self.handler.display_name().to_string(),
            });
        }

        let handler = Arc::clone(&self.handler);
        let services = self.services.clone();
        let run_site = site_id.clone();
        let run_id = sync_id.clone();

        let run = async move {
            let result = run_sync(handler, &services, &scope, &run_site).await;

            // Record the attempt, successful or not. Bookkeeping failures
            // never change the outcome.
            let now = Utc::now().timestamp();
            if let Err(error) = services.times.set_sync_time(&run_id, &run_site, now).await {
                tracing::debug!(%error, "could not record sync time, ignoring");
            }

            result
        };

        self.ongoing.begin(&sync_id, &site_id, run).await
    }

    /// Synchronize one entity only if enough time has passed since its last
    /// attempt. Returns `Ok(None)` when no sync was needed.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::sync_entity`].
    pub async fn sync_entity_if_needed(
        &self,
        scope: SyncScope,
        site_id: Option<&str>,
    ) -> Result<Option<SyncOutcome<H::Extra>>, SyncError> {
        let (scope, site_id) = self.resolve(scope, site_id);
        let sync_id = self.handler.sync_identifier(&scope);

        if self.is_sync_needed(&sync_id, &site_id).await {
            self.sync_entity(scope, Some(&site_id)).await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Synchronize every entity of this activity type with queued data, in
    /// one site or all configured sites.
    ///
    /// Entities run concurrently (no cross-entity ordering is guaranteed);
    /// results with `updated == true` are announced on the event bus so open
    /// views can refresh. The first per-entity error is returned after all
    /// runs settle.
    ///
    /// # Errors
    ///
    /// First failing entity's error, typically `Connectivity` or `Blocked`.
    pub async fn sync_all(&self, site_id: Option<&str>, force: bool) -> Result<(), SyncError> {
        let sites = match site_id {
            Some(site) => vec![site.to_string()],
            None => self.services.sites.site_ids(),
        };

        let mut first_error = None;
        for site in sites {
            if let Err(error) = self.sync_site(&site, force).await {
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    async fn sync_site(&self, site_id: &str, force: bool) -> Result<(), SyncError> {
        let pending = self.handler.load_all_pending(site_id).await?;

        // One attempt per identifier, however many actions are queued for it.
        let mut seen = HashSet::new();
        let mut scopes = Vec::new();
        for action in &pending {
            let scope = self.handler.scope_of(action);
            if seen.insert(self.handler.sync_identifier(&scope)) {
                scopes.push(scope);
            }
        }

        let runs = scopes.into_iter().map(|scope| {
            let site = site_id.to_string();
            async move {
                let result = if force {
                    self.sync_entity(scope.clone(), Some(&site)).await.map(Some)
                } else {
                    self.sync_entity_if_needed(scope.clone(), Some(&site)).await
                };
                (scope, result)
            }
        });

        let settled = futures::future::join_all(runs).await;

        let mut first_error = None;
        for (scope, result) in settled {
            match result {
                Ok(Some(outcome)) => {
                    self.report_batch_outcome(&scope, &outcome, site_id).await;
                }
                Ok(None) => {} // throttled, nothing happened
                Err(error) => {
                    tracing::warn!(
                        component = self.handler.component(),
                        entity_id = scope.entity_id,
                        %error,
                        "entity sync failed during batch"
                    );
                    first_error.get_or_insert(error);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    async fn report_batch_outcome(
        &self,
        scope: &SyncScope,
        outcome: &SyncOutcome<H::Extra>,
        site_id: &str,
    ) {
        if !outcome.warnings.is_empty() {
            // Stash warnings so the UI can surface them when the activity is
            // next opened.
            let sync_id = self.handler.sync_identifier(scope);
            if let Err(error) = self
                .services
                .times
                .set_sync_warnings(&sync_id, site_id, &outcome.warnings)
                .await
            {
                tracing::debug!(%error, "could not store sync warnings, ignoring");
            }
        }

        if outcome.updated {
            self.services.bus.publish(Event::new(
                &self.auto_synced_topic(),
                site_id,
                json!({
                    "entity_id": scope.entity_id,
                    "user_id": scope.user_id,
                    "group_id": scope.group_id,
                    "warnings": outcome.warnings,
                }),
            ));
        }
    }

    fn resolve(&self, mut scope: SyncScope, site_id: Option<&str>) -> (SyncScope, String) {
        let site_id = site_id
            .map(str::to_string)
            .unwrap_or_else(|| self.services.sites.current_site_id());

        if scope.user_id == 0 {
            scope.user_id = self.services.sites.current_user_id();
        }

        (scope, site_id)
    }
}

/// One entity's replay, executed under the ongoing-sync lock.
async fn run_sync<H: ActivityHandler>(
    handler: Arc<H>,
    services: &SyncServices,
    scope: &SyncScope,
    site_id: &str,
) -> RunResult<H::Extra> {
    tracing::debug!(
        component = handler.component(),
        entity_id = scope.entity_id,
        user_id = scope.user_id,
        site_id,
        "trying to sync"
    );

    let mut outcome = SyncOutcome::<H::Extra>::default();

    if let Err(error) = handler.sync_logs(scope, site_id).await {
        tracing::debug!(%error, "offline activity logs not synced, ignoring");
    }

    let pending = match handler.load_pending(scope, site_id).await {
        Ok(pending) => pending,
        Err(error) => {
            tracing::debug!(%error, "no offline data found");
            Vec::new()
        }
    };

    if pending.is_empty() {
        // Nothing to sync.
        return Ok(outcome);
    }

    if !services.connectivity.is_online() {
        // Local data stays intact for the next retry.
        return Err(SyncError::Connectivity(
            "cannot sync while the device is offline".to_string(),
        ));
    }

    let course_id = pending
        .iter()
        .map(|action| action.course_id)
        .find(|id| *id != 0)
        .unwrap_or(scope.course_id);

    let plan = handler
        .reconcile(scope, pending, &mut outcome, site_id)
        .await?;

    for action in &plan.discard {
        // The reconcile hook already pushed whatever warning applies.
        handler.remove_pending(action, site_id).await?;
    }

    // Sequential, in creation order: later actions may depend on earlier
    // ones having reached the server.
    for action in &plan.replay {
        match handler.submit(action, site_id).await {
            Ok(submitted) => {
                outcome.updated = true;
                handler.remove_pending(action, site_id).await?;

                if let Some(item_id) = submitted.item_id {
                    outcome.created.push(CreatedItem {
                        item_id,
                        title: action.title.clone(),
                    });
                }
            }
            Err(error) if error.is_server_rejection() => {
                // The server refused the content; it can never succeed.
                // Delete it and tell the user.
                outcome.updated = true;
                handler.remove_pending(action, site_id).await?;
                outcome.discard_with_warning(
                    handler.display_name(),
                    &action.title,
                    &error.to_string(),
                );

                tracing::warn!(
                    component = handler.component(),
                    entity_id = scope.entity_id,
                    title = %action.title,
                    %error,
                    "server rejected offline data, discarded"
                );
            }
            Err(error) => {
                // Transient: abort here, remaining actions are retried by
                // the next scheduled sync in the same order.
                return Err(error);
            }
        }
    }

    handler.after_replay(scope, &mut outcome, site_id).await?;

    if outcome.updated {
        if let Err(error) = handler.invalidate(scope, site_id).await {
            tracing::debug!(%error, "cache invalidation failed, ignoring");
        }

        if let Err(error) = services
            .prefetcher
            .prefetch_after_update(handler.component(), scope.entity_id, course_id, site_id)
            .await
        {
            tracing::debug!(%error, "prefetch after update failed, ignoring");
        }
    }

    Ok(outcome)
}
