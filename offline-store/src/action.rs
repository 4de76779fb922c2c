use serde::{Deserialize, Serialize};

/// A locally-queued user action waiting to be replayed against the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Site the action belongs to
    pub site_id: String,

    /// Owning component, e.g. `mod_choice`
    pub component: String,

    /// Activity instance the action targets
    pub entity_id: i64,

    /// User who performed the action
    pub user_id: i64,

    /// Group scope, 0 when the activity has no group mode
    pub group_id: i64,

    /// Course the entity belongs to, 0 when unknown
    pub course_id: i64,

    /// Natural key within the entity (glossary concept, wiki page title,
    /// question slot). Empty for single-action activities.
    pub item_key: String,

    /// Human-readable name used in warnings when the action is discarded
    pub title: String,

    /// Creation time in epoch seconds. Uniqueness key and "fake id" for
    /// items that don't have a server id yet.
    pub created_at: i64,

    /// Delete intent: the user removed something rather than created it
    pub deleting: bool,

    /// Type-specific fields (responses, definition, page text, answers)
    pub payload: serde_json::Value,
}

impl PendingAction {
    /// The composite key identifying this row.
    pub fn key(&self) -> ActionKey {
        ActionKey {
            site_id: self.site_id.clone(),
            component: self.component.clone(),
            entity_id: self.entity_id,
            user_id: self.user_id,
            item_key: self.item_key.clone(),
            created_at: self.created_at,
        }
    }

    /// Deserialize the payload into a typed per-activity struct.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> error_common::SyncResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Composite primary key of a pending action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub site_id: String,
    pub component: String,
    pub entity_id: i64,
    pub user_id: i64,
    pub item_key: String,
    pub created_at: i64,
}
