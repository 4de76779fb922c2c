//! In-memory store implementations for tests and engine development.

use crate::action::{ActionKey, PendingAction};
use crate::store::{EntityFilter, PendingStore};
use crate::times::SyncTimeStore;
use async_trait::async_trait;
use dashmap::DashMap;
use error_common::SyncResult;

#[derive(Default)]
pub struct MemoryPendingStore {
    actions: DashMap<ActionKey, PendingAction>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored actions, across all sites and components.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[async_trait]
impl PendingStore for MemoryPendingStore {
    async fn insert(&self, action: PendingAction) -> SyncResult<()> {
        self.actions.insert(action.key(), action);
        Ok(())
    }

    async fn get(&self, key: &ActionKey) -> SyncResult<Option<PendingAction>> {
        Ok(self.actions.get(key).map(|entry| entry.clone()))
    }

    async fn delete(&self, key: &ActionKey) -> SyncResult<()> {
        self.actions.remove(key);
        Ok(())
    }

    async fn delete_entity(
        &self,
        site_id: &str,
        component: &str,
        entity_id: i64,
        user_id: i64,
    ) -> SyncResult<()> {
        self.actions.retain(|key, _| {
            !(key.site_id == site_id
                && key.component == component
                && key.entity_id == entity_id
                && key.user_id == user_id)
        });
        Ok(())
    }

    async fn list_entity(
        &self,
        site_id: &str,
        component: &str,
        filter: &EntityFilter,
    ) -> SyncResult<Vec<PendingAction>> {
        let mut actions: Vec<PendingAction> = self
            .actions
            .iter()
            .filter(|entry| {
                entry.site_id == site_id
                    && entry.component == component
                    && filter.matches(entry.value())
            })
            .map(|entry| entry.clone())
            .collect();

        actions.sort_by_key(|action| action.created_at);
        Ok(actions)
    }

    async fn list_component(
        &self,
        site_id: &str,
        component: &str,
    ) -> SyncResult<Vec<PendingAction>> {
        let mut actions: Vec<PendingAction> = self
            .actions
            .iter()
            .filter(|entry| entry.site_id == site_id && entry.component == component)
            .map(|entry| entry.clone())
            .collect();

        actions.sort_by_key(|action| action.created_at);
        Ok(actions)
    }
}

#[derive(Default)]
pub struct MemorySyncTimeStore {
    times: DashMap<(String, String), i64>,
    warnings: DashMap<(String, String), Vec<String>>,
}

impl MemorySyncTimeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncTimeStore for MemorySyncTimeStore {
    async fn last_sync_time(&self, sync_id: &str, site_id: &str) -> SyncResult<Option<i64>> {
        Ok(self
            .times
            .get(&(site_id.to_string(), sync_id.to_string()))
            .map(|entry| *entry))
    }

    async fn set_sync_time(&self, sync_id: &str, site_id: &str, timestamp: i64) -> SyncResult<()> {
        self.times
            .insert((site_id.to_string(), sync_id.to_string()), timestamp);
        Ok(())
    }

    async fn set_sync_warnings(
        &self,
        sync_id: &str,
        site_id: &str,
        warnings: &[String],
    ) -> SyncResult<()> {
        self.warnings
            .insert((site_id.to_string(), sync_id.to_string()), warnings.to_vec());
        Ok(())
    }

    async fn sync_warnings(&self, sync_id: &str, site_id: &str) -> SyncResult<Vec<String>> {
        Ok(self
            .warnings
            .get(&(site_id.to_string(), sync_id.to_string()))
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }
}
