//! Glossary activity sync.
//!
//! A glossary can hold many independent pending entries per user, keyed by
//! concept. Entries may carry locally staged attachment files; those are
//! cleaned up together with the queued entry, on success and on discard
//! alike.

use async_trait::async_trait;
use chrono::Utc;
use error_common::SyncResult;
use offline_store::{EntityFilter, PendingAction, PendingStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sync_engine::{ActivityHandler, Submitted, SyncScope};

pub const COMPONENT: &str = "mod_glossary";

/// Lock and sync-time key for one (glossary, user) unit of work.
pub fn sync_identifier(glossary_id: i64, user_id: i64) -> String {
    format!("glossary#{glossary_id}#{user_id}")
}

/// Payload of a queued glossary entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub definition: String,
    /// Entry options (usedynalink, casesensitive, ...), passed through to
    /// the web service
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
    /// Whether attachment files were staged locally for this entry
    #[serde(default)]
    pub has_attachments: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GlossaryRemote: Send + Sync {
    /// Create the entry on the server, returning its new entry id.
    async fn add_entry_online(
        &self,
        glossary_id: i64,
        concept: &str,
        definition: &str,
        options: &serde_json::Map<String, serde_json::Value>,
        site_id: &str,
    ) -> SyncResult<i64>;

    /// Delete the attachment files staged locally for the entry identified
    /// by its creation timestamp.
    async fn delete_staged_files(
        &self,
        glossary_id: i64,
        entry_created_at: i64,
        site_id: &str,
    ) -> SyncResult<()>;
}

/// Queue a new entry while offline. Concepts are unique per (glossary, user);
/// re-queueing the same concept replaces the previous pending entry.
pub async fn queue_entry(
    store: &dyn PendingStore,
    site_id: &str,
    glossary_id: i64,
    course_id: i64,
    user_id: i64,
    concept: &str,
    entry: GlossaryEntry,
) -> SyncResult<()> {
    store
        .insert(PendingAction {
            site_id: site_id.to_string(),
            component: COMPONENT.to_string(),
            entity_id: glossary_id,
            user_id,
            group_id: 0,
            course_id,
            item_key: concept.to_string(),
            title: concept.to_string(),
            created_at: Utc::now().timestamp(),
            deleting: false,
            payload: serde_json::to_value(entry)?,
        })
        .await
}

pub struct GlossarySyncHandler {
    store: Arc<dyn PendingStore>,
    remote: Arc<dyn GlossaryRemote>,
}

impl GlossarySyncHandler {
    pub fn new(store: Arc<dyn PendingStore>, remote: Arc<dyn GlossaryRemote>) -> Self {
        Self { store, remote }
    }
}

#[async_trait]
impl ActivityHandler for GlossarySyncHandler {
    type Extra = ();

    fn component(&self) -> &'static str {
        COMPONENT
    }

    fn display_name(&self) -> &'static str {
        "glossary"
    }

    fn sync_identifier(&self, scope: &SyncScope) -> String {
        sync_identifier(scope.entity_id, scope.user_id)
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
        let payload: GlossaryEntry = action.payload_as()?;

        let entry_id = self
            .remote
            .add_entry_online(
                action.entity_id,
                &action.item_key,
                &payload.definition,
                &payload.options,
                site_id,
            )
            .await?;

        Ok(Submitted::created(entry_id))
    }

    async fn remove_pending(&self, action: &PendingAction, site_id: &str) -> SyncResult<()> {
        let payload: GlossaryEntry = action.payload_as()?;

        if payload.has_attachments {
            // Staged files are cleanup, not sync state. A failure here must
            // not resurrect the entry.
            if let Err(error) = self
                .remote
                .delete_staged_files(action.entity_id, action.created_at, site_id)
                .await
            {
                tracing::debug!(%error, concept = %action.item_key, "could not delete staged files, ignoring");
            }
        }

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
    use sync_engine::SyncEngine;

    fn entry(definition: &str, has_attachments: bool) -> GlossaryEntry {
        GlossaryEntry {
            definition: definition.to_string(),
            options: serde_json::Map::new(),
            has_attachments,
        }
    }

    #[tokio::test]
    async fn test_entries_are_created_and_reported() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_entry(store.as_ref(), "site1", 3, 10, 7, "Borrow", entry("Taking a reference", false))
            .await
            .unwrap();
        queue_entry(store.as_ref(), "site1", 3, 10, 7, "Lifetime", entry("Region of validity", false))
            .await
            .unwrap();

        let mut remote = MockGlossaryRemote::new();
        remote
            .expect_add_entry_online()
            .times(2)
            .returning(|_, concept, _, _, _| {
                Ok(if concept == "Borrow" { 501 } else { 502 })
            });

        let engine = SyncEngine::new(
            GlossarySyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );

        let outcome = engine
            .sync_entity(SyncScope::entity_user(3, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert_eq!(outcome.created.len(), 2);
        assert!(outcome.created.iter().any(|item| item.item_id == 501));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_concept_is_discarded_others_survive_the_run() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_entry(store.as_ref(), "site1", 3, 10, 7, "Borrow", entry("Duplicate", false))
            .await
            .unwrap();
        queue_entry(store.as_ref(), "site1", 3, 10, 7, "Lifetime", entry("Fine", false))
            .await
            .unwrap();

        let mut remote = MockGlossaryRemote::new();
        remote
            .expect_add_entry_online()
            .times(2)
            .returning(|_, concept, _, _, _| {
                if concept == "Borrow" {
                    Err(SyncError::ServerRejection("Concept already exists".to_string()))
                } else {
                    Ok(600)
                }
            });

        let engine = SyncEngine::new(
            GlossarySyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );

        let outcome = engine
            .sync_entity(SyncScope::entity_user(3, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("Borrow"));
        assert_eq!(outcome.created.len(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_staged_files_are_cleaned_up_with_the_entry() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_entry(store.as_ref(), "site1", 3, 10, 7, "Borrow", entry("With image", true))
            .await
            .unwrap();

        let mut remote = MockGlossaryRemote::new();
        remote
            .expect_add_entry_online()
            .times(1)
            .returning(|_, _, _, _, _| Ok(700));
        remote
            .expect_delete_staged_files()
            .withf(|glossary_id, _, site_id| *glossary_id == 3 && site_id == "site1")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let engine = SyncEngine::new(
            GlossarySyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );

        let outcome = engine
            .sync_entity(SyncScope::entity_user(3, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_staged_file_cleanup_failure_does_not_resurrect_the_entry() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_entry(store.as_ref(), "site1", 3, 10, 7, "Borrow", entry("With image", true))
            .await
            .unwrap();

        let mut remote = MockGlossaryRemote::new();
        remote
            .expect_add_entry_online()
            .times(1)
            .returning(|_, _, _, _, _| Ok(700));
        remote
            .expect_delete_staged_files()
            .times(1)
            .returning(|_, _, _| Err(SyncError::storage("file handle lost")));

        let engine = SyncEngine::new(
            GlossarySyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );

        let outcome = engine
            .sync_entity(SyncScope::entity_user(3, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert!(outcome.warnings.is_empty());
        assert!(store.is_empty());
    }
}
