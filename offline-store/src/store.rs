use crate::action::{ActionKey, PendingAction};
use async_trait::async_trait;
use error_common::SyncResult;

/// Filter for listing pending actions of one owning entity.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    pub entity_id: i64,
    /// Restrict to one user, `None` for the whole entity
    pub user_id: Option<i64>,
    /// Restrict to one group, `None` when the activity has no group mode
    pub group_id: Option<i64>,
}

impl EntityFilter {
    pub fn entity(entity_id: i64) -> Self {
        Self {
            entity_id,
            ..Self::default()
        }
    }

    pub fn entity_user(entity_id: i64, user_id: i64) -> Self {
        Self {
            entity_id,
            user_id: Some(user_id),
            group_id: None,
        }
    }

    pub fn matches(&self, action: &PendingAction) -> bool {
        action.entity_id == self.entity_id
            && self.user_id.map_or(true, |user| action.user_id == user)
            && self.group_id.map_or(true, |group| action.group_id == group)
    }
}

/// Local persistence of pending actions, shared by all sync engines.
///
/// Listings are always ordered by `created_at` ascending; the replay loop
/// depends on that ordering for actions with dependencies between them.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Insert an action, replacing any row with the same composite key.
    async fn insert(&self, action: PendingAction) -> SyncResult<()>;

    async fn get(&self, key: &ActionKey) -> SyncResult<Option<PendingAction>>;

    async fn delete(&self, key: &ActionKey) -> SyncResult<()>;

    /// Delete every action of one (entity, user) pair. Single-action
    /// activities call this before inserting an edited action.
    async fn delete_entity(
        &self,
        site_id: &str,
        component: &str,
        entity_id: i64,
        user_id: i64,
    ) -> SyncResult<()>;

    /// Pending actions of one entity, filtered and time-ordered.
    async fn list_entity(
        &self,
        site_id: &str,
        component: &str,
        filter: &EntityFilter,
    ) -> SyncResult<Vec<PendingAction>>;

    /// All pending actions of one component in a site, time-ordered. Used by
    /// the batch entry points to enumerate what needs syncing.
    async fn list_component(&self, site_id: &str, component: &str)
        -> SyncResult<Vec<PendingAction>>;
}
