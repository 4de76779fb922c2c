//! SQLite-backed implementations for the device database.

use crate::action::{ActionKey, PendingAction};
use crate::store::{EntityFilter, PendingStore};
use crate::times::SyncTimeStore;
use async_trait::async_trait;
use error_common::{SyncError, SyncResult};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

const CREATE_PENDING_ACTIONS: &str = r"
CREATE TABLE IF NOT EXISTS pending_actions (
    site_id    TEXT    NOT NULL,
    component  TEXT    NOT NULL,
    entity_id  INTEGER NOT NULL,
    user_id    INTEGER NOT NULL,
    group_id   INTEGER NOT NULL DEFAULT 0,
    course_id  INTEGER NOT NULL DEFAULT 0,
    item_key   TEXT    NOT NULL DEFAULT '',
    title      TEXT    NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    deleting   INTEGER NOT NULL DEFAULT 0,
    payload    TEXT    NOT NULL,
    PRIMARY KEY (site_id, component, entity_id, user_id, item_key, created_at)
)";

const CREATE_SYNC_TIMES: &str = r"
CREATE TABLE IF NOT EXISTS sync_times (
    site_id      TEXT    NOT NULL,
    sync_id      TEXT    NOT NULL,
    last_attempt INTEGER NOT NULL,
    warnings     TEXT    NOT NULL DEFAULT '[]',
    PRIMARY KEY (site_id, sync_id)
)";

/// Open a pooled connection to the device database.
///
/// # Errors
///
/// Returns `SyncError::Storage` when the database cannot be opened.
pub async fn open_database(url: &str) -> SyncResult<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await
        .map_err(SyncError::storage)
}

pub struct SqlitePendingStore {
    pool: SqlitePool,
}

impl SqlitePendingStore {
    /// Wrap a pool and make sure the schema exists.
    pub async fn new(pool: SqlitePool) -> SyncResult<Self> {
        sqlx::query(CREATE_PENDING_ACTIONS)
            .execute(&pool)
            .await
            .map_err(SyncError::storage)?;

        Ok(Self { pool })
    }

    fn row_to_action(row: &SqliteRow) -> SyncResult<PendingAction> {
        let payload_text: String = row.try_get("payload").map_err(SyncError::storage)?;
        let payload = serde_json::from_str(&payload_text)?;

        Ok(PendingAction {
            site_id: row.try_get("site_id").map_err(SyncError::storage)?,
            component: row.try_get("component").map_err(SyncError::storage)?,
            entity_id: row.try_get("entity_id").map_err(SyncError::storage)?,
            user_id: row.try_get("user_id").map_err(SyncError::storage)?,
            group_id: row.try_get("group_id").map_err(SyncError::storage)?,
            course_id: row.try_get("course_id").map_err(SyncError::storage)?,
            item_key: row.try_get("item_key").map_err(SyncError::storage)?,
            title: row.try_get("title").map_err(SyncError::storage)?,
            created_at: row.try_get("created_at").map_err(SyncError::storage)?,
            deleting: row.try_get("deleting").map_err(SyncError::storage)?,
            payload,
        })
    }
}

#[async_trait]
impl PendingStore for SqlitePendingStore {
    async fn insert(&self, action: PendingAction) -> SyncResult<()> {
        let payload_text = serde_json::to_string(&action.payload)?;

        sqlx::query(
            "INSERT OR REPLACE INTO pending_actions \
             (site_id, component, entity_id, user_id, group_id, course_id, \
              item_key, title, created_at, deleting, payload) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&action.site_id)
        .bind(&action.component)
        .bind(action.entity_id)
        .bind(action.user_id)
        .bind(action.group_id)
        .bind(action.course_id)
        .bind(&action.item_key)
        .bind(&action.title)
        .bind(action.created_at)
        .bind(action.deleting)
        .bind(payload_text)
        .execute(&self.pool)
        .await
        .map_err(SyncError::storage)?;

        Ok(())
    }

    async fn get(&self, key: &ActionKey) -> SyncResult<Option<PendingAction>> {
        let row = sqlx::query(
            "SELECT * FROM pending_actions \
             WHERE site_id = ? AND component = ? AND entity_id = ? \
               AND user_id = ? AND item_key = ? AND created_at = ?",
        )
        .bind(&key.site_id)
        .bind(&key.component)
        .bind(key.entity_id)
        .bind(key.user_id)
        .bind(&key.item_key)
        .bind(key.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(SyncError::storage)?;

        row.as_ref().map(Self::row_to_action).transpose()
    }

    async fn delete(&self, key: &ActionKey) -> SyncResult<()> {
        sqlx::query(
            "DELETE FROM pending_actions \
             WHERE site_id = ? AND component = ? AND entity_id = ? \
               AND user_id = ? AND item_key = ? AND created_at = ?",
        )
        .bind(&key.site_id)
        .bind(&key.component)
        .bind(key.entity_id)
        .bind(key.user_id)
        .bind(&key.item_key)
        .bind(key.created_at)
        .execute(&self.pool)
        .await
        .map_err(SyncError::storage)?;

        Ok(())
    }

    async fn delete_entity(
        &self,
        site_id: &str,
        component: &str,
        entity_id: i64,
        user_id: i64,
    ) -> SyncResult<()> {
        sqlx::query(
            "DELETE FROM pending_actions \
             WHERE site_id = ? AND component = ? AND entity_id = ? AND user_id = ?",
        )
        .bind(site_id)
        .bind(component)
        .bind(entity_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(SyncError::storage)?;

        Ok(())
    }

    async fn list_entity(
        &self,
        site_id: &str,
        component: &str,
        filter: &EntityFilter,
    ) -> SyncResult<Vec<PendingAction>> {
        let rows = sqlx::query(
            "SELECT * FROM pending_actions \
             WHERE site_id = ? AND component = ? AND entity_id = ? \
             ORDER BY created_at ASC",
        )
        .bind(site_id)
        .bind(component)
        .bind(filter.entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(SyncError::storage)?;

        let mut actions = Vec::with_capacity(rows.len());
        for row in &rows {
            let action = Self::row_to_action(row)?;
            // User/group scoping is narrower than the table key; filter here.
            if filter.matches(&action) {
                actions.push(action);
            }
        }

        Ok(actions)
    }

    async fn list_component(
        &self,
        site_id: &str,
        component: &str,
    ) -> SyncResult<Vec<PendingAction>> {
        let rows = sqlx::query(
            "SELECT * FROM pending_actions \
             WHERE site_id = ? AND component = ? \
             ORDER BY created_at ASC",
        )
        .bind(site_id)
        .bind(component)
        .fetch_all(&self.pool)
        .await
        .map_err(SyncError::storage)?;

        rows.iter().map(Self::row_to_action).collect()
    }
}

pub struct SqliteSyncTimeStore {
    pool: SqlitePool,
}

impl SqliteSyncTimeStore {
    /// Wrap a pool and make sure the schema exists.
    pub async fn new(pool: SqlitePool) -> SyncResult<Self> {
        sqlx::query(CREATE_SYNC_TIMES)
            .execute(&pool)
            .await
            .map_err(SyncError::storage)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl SyncTimeStore for SqliteSyncTimeStore {
    async fn last_sync_time(&self, sync_id: &str, site_id: &str) -> SyncResult<Option<i64>> {
        let row = sqlx::query(
            "SELECT last_attempt FROM sync_times WHERE site_id = ? AND sync_id = ?",
        )
        .bind(site_id)
        .bind(sync_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SyncError::storage)?;

        row.map(|row| row.try_get("last_attempt").map_err(SyncError::storage))
            .transpose()
    }

    async fn set_sync_time(&self, sync_id: &str, site_id: &str, timestamp: i64) -> SyncResult<()> {
        sqlx::query(
            "INSERT INTO sync_times (site_id, sync_id, last_attempt) VALUES (?, ?, ?) \
             ON CONFLICT (site_id, sync_id) DO UPDATE SET last_attempt = excluded.last_attempt",
        )
        .bind(site_id)
        .bind(sync_id)
        .bind(timestamp)
        .execute(&self.pool)
        .await
        .map_err(SyncError::storage)?;

        Ok(())
    }

    async fn set_sync_warnings(
        &self,
        sync_id: &str,
        site_id: &str,
        warnings: &[String],
    ) -> SyncResult<()> {
        let encoded = serde_json::to_string(warnings)?;

        sqlx::query(
            "INSERT INTO sync_times (site_id, sync_id, last_attempt, warnings) \
             VALUES (?, ?, 0, ?) \
             ON CONFLICT (site_id, sync_id) DO UPDATE SET warnings = excluded.warnings",
        )
        .bind(site_id)
        .bind(sync_id)
        .bind(encoded)
        .execute(&self.pool)
        .await
        .map_err(SyncError::storage)?;

        Ok(())
    }

    async fn sync_warnings(&self, sync_id: &str, site_id: &str) -> SyncResult<Vec<String>> {
        let row = sqlx::query(
            "SELECT warnings FROM sync_times WHERE site_id = ? AND sync_id = ?",
        )
        .bind(site_id)
        .bind(sync_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SyncError::storage)?;

        match row {
            Some(row) => {
                let encoded: String = row.try_get("warnings").map_err(SyncError::storage)?;
                Ok(serde_json::from_str(&encoded)?)
            }
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]

    use super::*;
    use serde_json::json;

    async fn memory_store() -> SqlitePendingStore {
        let pool = open_database("sqlite::memory:").await.unwrap();
        SqlitePendingStore::new(pool).await.unwrap()
    }

    fn action(entity_id: i64, item_key: &str, created_at: i64) -> PendingAction {
        PendingAction {
            site_id: "site1".to_string(),
            component: "mod_wiki".to_string(),
            entity_id,
            user_id: 7,
            group_id: 2,
            course_id: 10,
            item_key: item_key.to_string(),
            title: item_key.to_string(),
            created_at,
            deleting: false,
            payload: json!({ "content": "<p>hello</p>" }),
        }
    }

    #[tokio::test]
    async fn test_insert_get_delete_round_trip() {
        let store = memory_store().await;
        let stored = action(3, "New page", 100);

        store.insert(stored.clone()).await.unwrap();
        let fetched = store.get(&stored.key()).await.unwrap().unwrap();
        assert_eq!(fetched, stored);

        store.delete(&stored.key()).await.unwrap();
        assert!(store.get(&stored.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_entity_respects_group_filter() {
        let store = memory_store().await;
        let mut other_group = action(3, "Other page", 200);
        other_group.group_id = 5;

        store.insert(action(3, "New page", 100)).await.unwrap();
        store.insert(other_group).await.unwrap();

        let filter = EntityFilter {
            entity_id: 3,
            user_id: Some(7),
            group_id: Some(2),
        };
        let listed = store.list_entity("site1", "mod_wiki", &filter).await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].item_key, "New page");
    }

    #[tokio::test]
    async fn test_sync_times_upsert() {
        let pool = open_database("sqlite::memory:").await.unwrap();
        let times = SqliteSyncTimeStore::new(pool).await.unwrap();

        times.set_sync_time("3#7", "site1", 100).await.unwrap();
        times.set_sync_time("3#7", "site1", 200).await.unwrap();
        assert_eq!(times.last_sync_time("3#7", "site1").await.unwrap(), Some(200));

        times
            .set_sync_warnings("3#7", "site1", &["stale".to_string()])
            .await
            .unwrap();
        assert_eq!(
            times.sync_warnings("3#7", "site1").await.unwrap(),
            vec!["stale".to_string()]
        );
        // Warnings upsert must not clobber the timestamp.
        assert_eq!(times.last_sync_time("3#7", "site1").await.unwrap(), Some(200));
    }
}
