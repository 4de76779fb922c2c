//! Feedback activity sync.
//!
//! A feedback form is filled page by page; each page answered offline is one
//! pending action. The server validates pages against its own form state, so
//! replay order is the page order, not the order the user happened to save
//! them in.

use async_trait::async_trait;
use chrono::Utc;
use error_common::SyncResult;
use offline_store::{EntityFilter, PendingAction, PendingStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sync_engine::{ActivityHandler, Reconciliation, Submitted, SyncOutcome, SyncScope};

pub const COMPONENT: &str = "mod_feedback";

/// One answered form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    /// Wire name of the field, e.g. `multichoice_23`
    pub name: String,
    pub value: String,
}

/// Payload of one queued form page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPage {
    pub page: i64,
    pub responses: Vec<FeedbackResponse>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedbackRemote: Send + Sync {
    async fn process_page_online(
        &self,
        feedback_id: i64,
        page: i64,
        responses: &[FeedbackResponse],
        site_id: &str,
    ) -> SyncResult<()>;
}

/// Queue one answered page while offline, replacing a previously queued copy
/// of the same page.
#[allow(clippy::too_many_arguments)]
pub async fn queue_page(
    store: &dyn PendingStore,
    site_id: &str,
    feedback_id: i64,
    course_id: i64,
    user_id: i64,
    name: &str,
    page: i64,
    responses: Vec<FeedbackResponse>,
) -> SyncResult<()> {
    let queued = store
        .list_entity(
            site_id,
            COMPONENT,
            &EntityFilter::entity_user(feedback_id, user_id),
        )
        .await?;

    // One row per page: a re-answered page replaces the queued one.
    for action in queued {
        if action.item_key == format!("page{page}") {
            store.delete(&action.key()).await?;
        }
    }

    store
        .insert(PendingAction {
            site_id: site_id.to_string(),
            component: COMPONENT.to_string(),
            entity_id: feedback_id,
            user_id,
            group_id: 0,
            course_id,
            item_key: format!("page{page}"),
            title: name.to_string(),
            created_at: Utc::now().timestamp(),
            deleting: false,
            payload: serde_json::to_value(FeedbackPage { page, responses })?,
        })
        .await
}

pub struct FeedbackSyncHandler {
    store: Arc<dyn PendingStore>,
    remote: Arc<dyn FeedbackRemote>,
}

impl FeedbackSyncHandler {
    pub fn new(store: Arc<dyn PendingStore>, remote: Arc<dyn FeedbackRemote>) -> Self {
        Self { store, remote }
    }
}

#[async_trait]
impl ActivityHandler for FeedbackSyncHandler {
    type Extra = ();

    fn component(&self) -> &'static str {
        COMPONENT
    }

    fn display_name(&self) -> &'static str {
        "feedback"
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

    async fn reconcile(
        &self,
        _scope: &SyncScope,
        mut pending: Vec<PendingAction>,
        _outcome: &mut SyncOutcome<()>,
        _site_id: &str,
    ) -> SyncResult<Reconciliation> {
        // Pages can be saved out of order; the server wants them in form
        // order.
        pending.sort_by_key(|action| {
            action
                .payload_as::<FeedbackPage>()
                .map(|page| page.page)
                .unwrap_or(i64::MAX)
        });

        Ok(Reconciliation::replay_all(pending))
    }

    async fn submit(&self, action: &PendingAction, site_id: &str) -> SyncResult<Submitted> {
        let payload: FeedbackPage = action.payload_as()?;

        self.remote
            .process_page_online(action.entity_id, payload.page, &payload.responses, site_id)
            .await?;

        Ok(Submitted::default())
    }

    async fn remove_pending(&self, action: &PendingAction, _site_id: &str) -> SyncResult<()> {
        self.store.delete(&action.key()).await
    }
}
