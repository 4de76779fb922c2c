//! Wiki activity sync.
//!
//! Offline work on a wiki is queued new pages, keyed by title within one
//! subwiki. A subwiki that only exists locally has no server id yet, so its
//! unit of work is identified by the (wiki, user, group) triple; the server
//! creates the subwiki together with its first page.

use async_trait::async_trait;
use chrono::Utc;
use error_common::SyncResult;
use offline_store::{EntityFilter, PendingAction, PendingStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sync_engine::{ActivityHandler, Submitted, SyncScope};

pub const COMPONENT: &str = "mod_wiki";

/// Lock and sync-time key for one subwiki: the subwiki id when it exists on
/// the server, the (wiki, user, group) composite while it is local-only.
/// UI editing flows block on the same key.
pub fn subwiki_identifier(subwiki_id: i64, wiki_id: i64, user_id: i64, group_id: i64) -> String {
    if subwiki_id > 0 {
        subwiki_id.to_string()
    } else {
        format!("{wiki_id}:{user_id}:{group_id}")
    }
}

/// Payload of a queued new wiki page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiNewPage {
    /// Server subwiki id, 0 when the subwiki itself is local-only
    #[serde(default)]
    pub subwiki_id: i64,
    pub content: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WikiRemote: Send + Sync {
    /// Create a page on the server, returning its new page id. When
    /// `subwiki_id` is 0 the server resolves (and creates) the subwiki from
    /// the (wiki, user, group) triple.
    #[allow(clippy::too_many_arguments)]
    async fn new_page_online(
        &self,
        title: &str,
        content: &str,
        subwiki_id: i64,
        wiki_id: i64,
        user_id: i64,
        group_id: i64,
        site_id: &str,
    ) -> SyncResult<i64>;
}

/// Queue a new page while offline. Titles are unique per subwiki;
/// re-queueing the same title replaces the previous pending page.
#[allow(clippy::too_many_arguments)]
pub async fn queue_new_page(
    store: &dyn PendingStore,
    site_id: &str,
    wiki_id: i64,
    course_id: i64,
    user_id: i64,
    group_id: i64,
    title: &str,
    page: WikiNewPage,
) -> SyncResult<()> {
    store
        .insert(PendingAction {
            site_id: site_id.to_string(),
            component: COMPONENT.to_string(),
            entity_id: wiki_id,
            user_id,
            group_id,
            course_id,
            item_key: title.to_string(),
            title: title.to_string(),
            created_at: Utc::now().timestamp(),
            deleting: false,
            payload: serde_json::to_value(page)?,
        })
        .await
}

pub struct WikiSyncHandler {
    store: Arc<dyn PendingStore>,
    remote: Arc<dyn WikiRemote>,
}

impl WikiSyncHandler {
    pub fn new(store: Arc<dyn PendingStore>, remote: Arc<dyn WikiRemote>) -> Self {
        Self { store, remote }
    }
}

#[async_trait]
impl ActivityHandler for WikiSyncHandler {
    type Extra = ();

    fn component(&self) -> &'static str {
        COMPONENT
    }

    fn display_name(&self) -> &'static str {
        "wiki"
    }

    fn sync_identifier(&self, scope: &SyncScope) -> String {
        // Queued rows always carry the triple; the subwiki-id form is used
        // by UI flows that block an existing subwiki.
        subwiki_identifier(0, scope.entity_id, scope.user_id, scope.group_id)
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
                &EntityFilter {
                    entity_id: scope.entity_id,
                    user_id: Some(scope.user_id),
                    group_id: Some(scope.group_id),
                },
            )
            .await
    }

    async fn load_all_pending(&self, site_id: &str) -> SyncResult<Vec<PendingAction>> {
        self.store.list_component(site_id, COMPONENT).await
    }

    async fn submit(&self, action: &PendingAction, site_id: &str) -> SyncResult<Submitted> {
        let payload: WikiNewPage = action.payload_as()?;

        let page_id = self
            .remote
            .new_page_online(
                &action.item_key,
                &payload.content,
                payload.subwiki_id,
                action.entity_id,
                action.user_id,
                action.group_id,
                site_id,
            )
            .await?;

        Ok(Submitted::created(page_id))
    }

    async fn remove_pending(&self, action: &PendingAction, _site_id: &str) -> SyncResult<()> {
        self.store.delete(&action.key()).await
    }
}
