//! Forum activity sync.
//!
//! Two kinds of queued actions share the forum's queue: new discussions and
//! replies. A discussion created offline has no server id yet; it is
//! identified locally by the negated creation timestamp, and replies queued
//! against it carry that provisional id. Replay order (creation order)
//! guarantees the discussion is submitted first, at which point the
//! provisional id is resolved to the server one for the replies that follow.

use async_trait::async_trait;
use chrono::Utc;
use error_common::SyncResult;
use offline_store::{EntityFilter, PendingAction, PendingStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use sync_engine::{ActivityHandler, Submitted, SyncScope};

pub const COMPONENT: &str = "mod_forum";

/// Payload of a queued forum action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ForumPost {
    /// A new discussion thread
    Discussion {
        subject: String,
        message: String,
        #[serde(default)]
        group_id: i64,
    },
    /// A reply within an existing (or offline-created) discussion
    Reply {
        /// Server discussion id, or the provisional negative id of an
        /// offline discussion
        discussion_id: i64,
        /// Post being replied to; 0 targets the discussion's first post
        parent_post_id: i64,
        subject: String,
        message: String,
    },
}

/// Provisional id of a discussion queued at `created_at`.
pub fn provisional_discussion_id(created_at: i64) -> i64 {
    -created_at
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForumRemote: Send + Sync {
    /// Create the discussion on the server, returning its discussion id.
    async fn add_discussion_online(
        &self,
        forum_id: i64,
        subject: &str,
        message: &str,
        group_id: i64,
        site_id: &str,
    ) -> SyncResult<i64>;

    /// Post a reply, returning the new post id.
    async fn reply_online(
        &self,
        discussion_id: i64,
        parent_post_id: i64,
        subject: &str,
        message: &str,
        site_id: &str,
    ) -> SyncResult<i64>;
}

/// Queue a new discussion while offline, returning its provisional id so
/// replies can reference it before it exists on the server.
#[allow(clippy::too_many_arguments)]
pub async fn queue_discussion(
    store: &dyn PendingStore,
    site_id: &str,
    forum_id: i64,
    course_id: i64,
    user_id: i64,
    group_id: i64,
    subject: &str,
    message: &str,
) -> SyncResult<i64> {
    let created_at = Utc::now().timestamp();

    store
        .insert(PendingAction {
            site_id: site_id.to_string(),
            component: COMPONENT.to_string(),
            entity_id: forum_id,
            user_id,
            group_id,
            course_id,
            item_key: format!("discussion{created_at}"),
            title: subject.to_string(),
            created_at,
            deleting: false,
            payload: serde_json::to_value(ForumPost::Discussion {
                subject: subject.to_string(),
                message: message.to_string(),
                group_id,
            })?,
        })
        .await?;

    Ok(provisional_discussion_id(created_at))
}

/// Queue a reply while offline. `discussion_id` may be a provisional id
/// returned by [`queue_discussion`].
#[allow(clippy::too_many_arguments)]
pub async fn queue_reply(
    store: &dyn PendingStore,
    site_id: &str,
    forum_id: i64,
    course_id: i64,
    user_id: i64,
    discussion_id: i64,
    parent_post_id: i64,
    subject: &str,
    message: &str,
) -> SyncResult<()> {
    store
        .insert(PendingAction {
            site_id: site_id.to_string(),
            component: COMPONENT.to_string(),
            entity_id: forum_id,
            user_id,
            group_id: 0,
            course_id,
            item_key: format!("reply{discussion_id}#{parent_post_id}"),
            title: subject.to_string(),
            created_at: Utc::now().timestamp(),
            deleting: false,
            payload: serde_json::to_value(ForumPost::Reply {
                discussion_id,
                parent_post_id,
                subject: subject.to_string(),
                message: message.to_string(),
            })?,
        })
        .await
}

pub struct ForumSyncHandler {
    store: Arc<dyn PendingStore>,
    remote: Arc<dyn ForumRemote>,
    /// Provisional discussion id -> server id, filled as discussions are
    /// created during a run
    resolved: Mutex<HashMap<i64, i64>>,
}

impl ForumSyncHandler {
    pub fn new(store: Arc<dyn PendingStore>, remote: Arc<dyn ForumRemote>) -> Self {
        Self {
            store,
            remote,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Rewrite queued replies that reference a provisional discussion id with
    /// the server id, so a run aborted between the discussion and its replies
    /// leaves resolvable rows behind. Best-effort: the in-run map already
    /// covers the current replay.
    async fn persist_resolution(
        &self,
        discussion: &PendingAction,
        discussion_id: i64,
        site_id: &str,
    ) -> SyncResult<()> {
        let provisional = provisional_discussion_id(discussion.created_at);
        let queued = self
            .store
            .list_entity(
                site_id,
                COMPONENT,
                &EntityFilter::entity_user(discussion.entity_id, discussion.user_id),
            )
            .await?;

        for mut action in queued {
            let ForumPost::Reply {
                discussion_id: target,
                parent_post_id,
                subject,
                message,
            } = action.payload_as()?
            else {
                continue;
            };

            if target == provisional {
                // Same composite key: the insert replaces the row in place.
                action.payload = serde_json::to_value(ForumPost::Reply {
                    discussion_id,
                    parent_post_id,
                    subject,
                    message,
                })?;
                self.store.insert(action).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ActivityHandler for ForumSyncHandler {
    type Extra = ();

    fn component(&self) -> &'static str {
        COMPONENT
    }

    fn display_name(&self) -> &'static str {
        "forum"
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
        match action.payload_as()? {
            ForumPost::Discussion {
                subject,
                message,
                group_id,
            } => {
                let discussion_id = self
                    .remote
                    .add_discussion_online(action.entity_id, &subject, &message, group_id, site_id)
                    .await?;

                self.resolved
                    .lock()
                    .insert(provisional_discussion_id(action.created_at), discussion_id);

                // The discussion exists on the server now. Rewrite dependent
                // queued replies with the real id so they survive an aborted
                // run; the in-run map already covers this replay.
                if let Err(error) = self.persist_resolution(action, discussion_id, site_id).await {
                    tracing::warn!(%error, discussion_id, "could not rewrite queued replies");
                }

                Ok(Submitted::created(discussion_id))
            }
            ForumPost::Reply {
                discussion_id,
                parent_post_id,
                subject,
                message,
            } => {
                let discussion_id = if discussion_id < 0 {
                    // The reply targets an offline discussion. Creation order
                    // put the discussion first, and a successful creation
                    // rewrites the queued replies, so a provisional id with
                    // no mapping means the discussion was rejected in this
                    // run and the reply is orphaned.
                    self.resolved.lock().get(&discussion_id).copied().ok_or_else(|| {
                        error_common::SyncError::ServerRejection(
                            "The discussion this reply belongs to could not be created"
                                .to_string(),
                        )
                    })?
                } else {
                    discussion_id
                };

                let post_id = self
                    .remote
                    .reply_online(discussion_id, parent_post_id, &subject, &message, site_id)
                    .await?;

                Ok(Submitted::created(post_id))
            }
        }
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
    use sync_engine::SyncEngine;

    fn action(item_key: &str, created_at: i64, post: ForumPost) -> PendingAction {
        let title = match &post {
            ForumPost::Discussion { subject, .. } | ForumPost::Reply { subject, .. } => {
                subject.clone()
            }
        };

        PendingAction {
            site_id: "site1".to_string(),
            component: COMPONENT.to_string(),
            entity_id: 8,
            user_id: 7,
            group_id: 0,
            course_id: 10,
            item_key: item_key.to_string(),
            title,
            created_at,
            deleting: false,
            payload: serde_json::to_value(post).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_reply_to_offline_discussion_uses_resolved_id() {
        let store = Arc::new(MemoryPendingStore::new());
        store
            .insert(action(
                "discussion100",
                100,
                ForumPost::Discussion {
                    subject: "Week 1 questions".to_string(),
                    message: "Post them here".to_string(),
                    group_id: 0,
                },
            ))
            .await
            .unwrap();
        store
            .insert(action(
                "reply-100#0",
                200,
                ForumPost::Reply {
                    discussion_id: provisional_discussion_id(100),
                    parent_post_id: 0,
                    subject: "Re: Week 1 questions".to_string(),
                    message: "First question".to_string(),
                },
            ))
            .await
            .unwrap();

        let mut remote = MockForumRemote::new();
        remote
            .expect_add_discussion_online()
            .times(1)
            .returning(|_, _, _, _, _| Ok(3000));
        remote
            .expect_reply_online()
            .withf(|discussion_id, parent, _, _, _| *discussion_id == 3000 && *parent == 0)
            .times(1)
            .returning(|_, _, _, _, _| Ok(3001));

        let engine = SyncEngine::new(
            ForumSyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );

        let outcome = engine
            .sync_entity(SyncScope::entity_user(8, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert_eq!(outcome.created.len(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_orphaned_reply_is_discarded_when_discussion_rejected() {
        let store = Arc::new(MemoryPendingStore::new());
        store
            .insert(action(
                "discussion100",
                100,
                ForumPost::Discussion {
                    subject: "Spam thread".to_string(),
                    message: "spam".to_string(),
                    group_id: 0,
                },
            ))
            .await
            .unwrap();
        store
            .insert(action(
                "reply-100#0",
                200,
                ForumPost::Reply {
                    discussion_id: provisional_discussion_id(100),
                    parent_post_id: 0,
                    subject: "Re: Spam thread".to_string(),
                    message: "more spam".to_string(),
                },
            ))
            .await
            .unwrap();

        let mut remote = MockForumRemote::new();
        remote
            .expect_add_discussion_online()
            .times(1)
            .returning(|_, _, _, _, _| {
                Err(SyncError::ServerRejection("Posting not allowed".to_string()))
            });

        let engine = SyncEngine::new(
            ForumSyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );

        let outcome = engine
            .sync_entity(SyncScope::entity_user(8, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        // Both the discussion and its dependent reply were discarded, each
        // with its own warning.
        assert_eq!(outcome.warnings.len(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reply_survives_restart_after_transient_failure() {
        let store = Arc::new(MemoryPendingStore::new());
        store
            .insert(action(
                "discussion100",
                100,
                ForumPost::Discussion {
                    subject: "Week 2 questions".to_string(),
                    message: "Post them here".to_string(),
                    group_id: 0,
                },
            ))
            .await
            .unwrap();
        store
            .insert(action(
                "reply-100#0",
                200,
                ForumPost::Reply {
                    discussion_id: provisional_discussion_id(100),
                    parent_post_id: 0,
                    subject: "Re: Week 2 questions".to_string(),
                    message: "First question".to_string(),
                },
            ))
            .await
            .unwrap();

        // First run: the discussion is created, then the connection drops
        // before the reply goes through.
        let mut remote = MockForumRemote::new();
        remote
            .expect_add_discussion_online()
            .times(1)
            .returning(|_, _, _, _, _| Ok(3000));
        remote
            .expect_reply_online()
            .times(1)
            .returning(|_, _, _, _, _| Err(SyncError::connectivity("connection reset")));

        let engine = SyncEngine::new(
            ForumSyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );
        let error = engine
            .sync_entity(SyncScope::entity_user(8, 7), None)
            .await
            .unwrap_err();
        assert!(matches!(error, SyncError::Connectivity(_)));

        // The reply is still queued and now carries the server id.
        let kept = store.list_component("site1", COMPONENT).await.unwrap();
        assert_eq!(kept.len(), 1);
        match kept[0].payload_as::<ForumPost>().unwrap() {
            ForumPost::Reply { discussion_id, .. } => assert_eq!(discussion_id, 3000),
            other => panic!("unexpected queued action: {other:?}"),
        }

        // Second run after a restart: a fresh handler has no in-memory state
        // but the rewritten row resolves on its own.
        let mut remote = MockForumRemote::new();
        remote
            .expect_reply_online()
            .withf(|discussion_id, parent, _, _, _| *discussion_id == 3000 && *parent == 0)
            .times(1)
            .returning(|_, _, _, _, _| Ok(3001));

        let engine = SyncEngine::new(
            ForumSyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );
        let outcome = engine
            .sync_entity(SyncScope::entity_user(8, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert!(outcome.warnings.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reply_to_existing_discussion_passes_ids_through() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_reply(
            store.as_ref(),
            "site1",
            8,
            10,
            7,
            555,
            777,
            "Re: Existing",
            "Answer",
        )
        .await
        .unwrap();

        let mut remote = MockForumRemote::new();
        remote
            .expect_reply_online()
            .withf(|discussion_id, parent, _, _, _| *discussion_id == 555 && *parent == 777)
            .times(1)
            .returning(|_, _, _, _, _| Ok(4000));

        let engine = SyncEngine::new(
            ForumSyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );

        let outcome = engine
            .sync_entity(SyncScope::entity_user(8, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert!(store.is_empty());
    }
}
