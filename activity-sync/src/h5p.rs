//! H5P activity sync.
//!
//! H5P packages report progress as xAPI statements. While offline each play
//! session queues one batch of statements against the activity's context;
//! batches replay in session order. The unit of work is the context, not a
//! (context, user) pair: statements already carry their actor.

use async_trait::async_trait;
use chrono::Utc;
use error_common::SyncResult;
use offline_store::{EntityFilter, PendingAction, PendingStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sync_engine::{ActivityHandler, Submitted, SyncScope};

pub const COMPONENT: &str = "mod_h5pactivity";

/// Payload of one queued statement batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementBatch {
    /// Raw xAPI statements, opaque to the sync layer
    pub statements: Vec<serde_json::Value>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait H5pRemote: Send + Sync {
    async fn post_statements_online(
        &self,
        context_id: i64,
        statements: &[serde_json::Value],
        site_id: &str,
    ) -> SyncResult<()>;
}

/// Queue one play session's statements while offline.
pub async fn queue_statements(
    store: &dyn PendingStore,
    site_id: &str,
    context_id: i64,
    course_id: i64,
    user_id: i64,
    name: &str,
    statements: Vec<serde_json::Value>,
) -> SyncResult<()> {
    store
        .insert(PendingAction {
            site_id: site_id.to_string(),
            component: COMPONENT.to_string(),
            entity_id: context_id,
            user_id,
            group_id: 0,
            course_id,
            item_key: String::new(),
            title: name.to_string(),
            created_at: Utc::now().timestamp(),
            deleting: false,
            payload: serde_json::to_value(StatementBatch { statements })?,
        })
        .await
}

pub struct H5pSyncHandler {
    store: Arc<dyn PendingStore>,
    remote: Arc<dyn H5pRemote>,
}

impl H5pSyncHandler {
    pub fn new(store: Arc<dyn PendingStore>, remote: Arc<dyn H5pRemote>) -> Self {
        Self { store, remote }
    }
}

#[async_trait]
impl ActivityHandler for H5pSyncHandler {
    type Extra = ();

    fn component(&self) -> &'static str {
        COMPONENT
    }

    fn display_name(&self) -> &'static str {
        "H5P activity"
    }

    fn sync_identifier(&self, scope: &SyncScope) -> String {
        scope.entity_id.to_string()
    }

    async fn load_pending(
        &self,
        scope: &SyncScope,
        site_id: &str,
    ) -> SyncResult<Vec<PendingAction>> {
        self.store
            .list_entity(site_id, COMPONENT, &EntityFilter::entity(scope.entity_id))
            .await
    }

    async fn load_all_pending(&self, site_id: &str) -> SyncResult<Vec<PendingAction>> {
        self.store.list_component(site_id, COMPONENT).await
    }

    async fn submit(&self, action: &PendingAction, site_id: &str) -> SyncResult<Submitted> {
        let payload: StatementBatch = action.payload_as()?;

        self.remote
            .post_statements_online(action.entity_id, &payload.statements, site_id)
            .await?;

        Ok(Submitted::default())
    }

    async fn remove_pending(&self, action: &PendingAction, _site_id: &str) -> SyncResult<()> {
        self.store.delete(&action.key()).await
    }
}
