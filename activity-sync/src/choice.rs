//! Choice activity sync.
//!
//! A choice holds at most one pending action per (choice, user): the user's
//! latest responses, or a delete intent when they withdrew their answer.
//! Editing while offline replaces the previous pending action.

use async_trait::async_trait;
use chrono::Utc;
use error_common::SyncResult;
use offline_store::{EntityFilter, PendingAction, PendingStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sync_engine::{ActivityHandler, LogReplay, NoopLogReplay, Submitted, SyncScope};

pub const COMPONENT: &str = "mod_choice";

/// Payload of a queued choice action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceResponse {
    /// Selected option ids (or the ids to delete when the action is a
    /// delete intent)
    pub responses: Vec<i64>,
}

/// Remote web-service operations for choices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChoiceRemote: Send + Sync {
    async fn submit_response_online(
        &self,
        choice_id: i64,
        responses: &[i64],
        site_id: &str,
    ) -> SyncResult<()>;

    async fn delete_responses_online(
        &self,
        choice_id: i64,
        responses: &[i64],
        site_id: &str,
    ) -> SyncResult<()>;
}

/// Queue responses while offline, replacing any previous pending action for
/// this (choice, user).
#[allow(clippy::too_many_arguments)]
pub async fn queue_response(
    store: &dyn PendingStore,
    site_id: &str,
    choice_id: i64,
    course_id: i64,
    user_id: i64,
    name: &str,
    responses: Vec<i64>,
    deleting: bool,
) -> SyncResult<()> {
    store
        .delete_entity(site_id, COMPONENT, choice_id, user_id)
        .await?;

    store
        .insert(PendingAction {
            site_id: site_id.to_string(),
            component: COMPONENT.to_string(),
            entity_id: choice_id,
            user_id,
            group_id: 0,
            course_id,
            item_key: String::new(),
            title: name.to_string(),
            created_at: Utc::now().timestamp(),
            deleting,
            payload: serde_json::to_value(ChoiceResponse { responses })?,
        })
        .await
}

pub struct ChoiceSyncHandler {
    store: Arc<dyn PendingStore>,
    remote: Arc<dyn ChoiceRemote>,
    logs: Arc<dyn LogReplay>,
}

impl ChoiceSyncHandler {
    pub fn new(store: Arc<dyn PendingStore>, remote: Arc<dyn ChoiceRemote>) -> Self {
        Self {
            store,
            remote,
            logs: Arc::new(NoopLogReplay),
        }
    }

    /// Replay view logs recorded while offline at the start of each run.
    pub fn with_log_replay(mut self, logs: Arc<dyn LogReplay>) -> Self {
        self.logs = logs;
        self
    }
}

#[async_trait]
impl ActivityHandler for ChoiceSyncHandler {
    type Extra = ();

    fn component(&self) -> &'static str {
        COMPONENT
    }

    fn display_name(&self) -> &'static str {
        "choice"
    }

    async fn sync_logs(&self, scope: &SyncScope, site_id: &str) -> SyncResult<()> {
        self.logs
            .sync_activity_logs(COMPONENT, scope.entity_id, site_id)
            .await
    }

    async fn load_pending(
        &self,
        scope: &SyncScope,
        site_id: &str,
    ) -> SyncResult<Vec<PendingAction>> {
        self.store
            .list_entity(
                site_id,
                COMPONENT,
                &EntityFilter::entity_user(scope.entity_id, scope.user_id),
            )
            .await
    }

    async fn load_all_pending(&self, site_id: &str) -> SyncResult<Vec<PendingAction>> {
        self.store.list_component(site_id, COMPONENT).await
    }

    async fn submit(&self, action: &PendingAction, site_id: &str) -> SyncResult<Submitted> {
        let payload: ChoiceResponse = action.payload_as()?;

        if action.deleting {
            self.remote
                .delete_responses_online(action.entity_id, &payload.responses, site_id)
                .await?;
        } else {
            self.remote
                .submit_response_online(action.entity_id, &payload.responses, site_id)
                .await?;
        }

        Ok(Submitted::default())
    }

    async fn remove_pending(&self, action: &PendingAction, _site_id: &str) -> SyncResult<()> {
        self.store.delete(&action.key()).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]

    use super::*;
    use crate::testing;
    use error_common::SyncError;
    use offline_store::MemoryPendingStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sync_engine::{Prefetcher, SyncEngine};

    struct CountingPrefetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Prefetcher for CountingPrefetcher {
        async fn prefetch_after_update(
            &self,
            component: &str,
            entity_id: i64,
            _course_id: i64,
            _site_id: &str,
        ) -> SyncResult<()> {
            assert_eq!(component, COMPONENT);
            assert_eq!(entity_id, 42);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_queued_response_is_submitted_and_cleared() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_response(store.as_ref(), "site1", 42, 10, 7, "Lunch choice", vec![1, 3], false)
            .await
            .unwrap();

        let mut remote = MockChoiceRemote::new();
        remote
            .expect_submit_response_online()
            .withf(|choice_id, responses, site_id| {
                *choice_id == 42 && responses == [1, 3] && site_id == "site1"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let prefetcher = Arc::new(CountingPrefetcher {
            calls: AtomicUsize::new(0),
        });
        let engine = SyncEngine::new(
            ChoiceSyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services_with(prefetcher.clone()),
        );

        let outcome = engine
            .sync_entity(SyncScope::entity_user(42, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert!(outcome.warnings.is_empty());
        assert!(store.is_empty());
        assert_eq!(prefetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delete_intent_uses_delete_operation() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_response(store.as_ref(), "site1", 42, 10, 7, "Lunch choice", vec![2], true)
            .await
            .unwrap();

        let mut remote = MockChoiceRemote::new();
        remote
            .expect_delete_responses_online()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let engine = SyncEngine::new(
            ChoiceSyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );

        let outcome = engine
            .sync_entity(SyncScope::entity_user(42, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_response_is_discarded_with_warning() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_response(store.as_ref(), "site1", 42, 10, 7, "Lunch choice", vec![9], false)
            .await
            .unwrap();

        let mut remote = MockChoiceRemote::new();
        remote
            .expect_submit_response_online()
            .times(1)
            .returning(|_, _, _| Err(SyncError::ServerRejection("Option closed".to_string())));

        let engine = SyncEngine::new(
            ChoiceSyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );

        let outcome = engine
            .sync_entity(SyncScope::entity_user(42, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("Lunch choice"));
        assert!(store.is_empty());
    }

    struct CountingLogReplay {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LogReplay for CountingLogReplay {
        async fn sync_activity_logs(
            &self,
            component: &str,
            entity_id: i64,
            site_id: &str,
        ) -> SyncResult<()> {
            assert_eq!(component, COMPONENT);
            assert_eq!(entity_id, 42);
            assert_eq!(site_id, "site1");
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_offline_view_logs_are_replayed_during_sync() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_response(store.as_ref(), "site1", 42, 10, 7, "Lunch choice", vec![1], false)
            .await
            .unwrap();

        let mut remote = MockChoiceRemote::new();
        remote
            .expect_submit_response_online()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let logs = Arc::new(CountingLogReplay {
            calls: AtomicUsize::new(0),
        });
        let handler = ChoiceSyncHandler::new(store.clone(), Arc::new(remote))
            .with_log_replay(logs.clone());
        let engine = SyncEngine::new(handler, testing::services());

        let outcome = engine
            .sync_entity(SyncScope::entity_user(42, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert_eq!(logs.calls.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_editing_replaces_previous_pending_action() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_response(store.as_ref(), "site1", 42, 10, 7, "Lunch choice", vec![1], false)
            .await
            .unwrap();
        queue_response(store.as_ref(), "site1", 42, 10, 7, "Lunch choice", vec![2], false)
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        let actions = store.list_component("site1", COMPONENT).await.unwrap();
        let payload: ChoiceResponse = actions[0].payload_as().unwrap();
        assert_eq!(payload.responses, vec![2]);
    }
}
