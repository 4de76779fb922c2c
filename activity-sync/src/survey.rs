//! Survey activity sync.
//!
//! A survey is answered once per user; the queue holds at most one pending
//! action per (survey, user) with the full answer set.

use async_trait::async_trait;
use chrono::Utc;
use error_common::SyncResult;
use offline_store::{EntityFilter, PendingAction, PendingStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sync_engine::{ActivityHandler, Submitted, SyncScope};

pub const COMPONENT: &str = "mod_survey";

/// One answered survey question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyAnswer {
    /// Wire name of the question field, e.g. `q5`
    pub key: String,
    pub value: String,
}

/// Payload of a queued survey submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyAnswers {
    pub answers: Vec<SurveyAnswer>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SurveyRemote: Send + Sync {
    async fn submit_answers_online(
        &self,
        survey_id: i64,
        answers: &[SurveyAnswer],
        site_id: &str,
    ) -> SyncResult<()>;
}

/// Queue answers while offline, replacing any previous pending submission
/// for this (survey, user).
pub async fn queue_answers(
    store: &dyn PendingStore,
    site_id: &str,
    survey_id: i64,
    course_id: i64,
    user_id: i64,
    name: &str,
    answers: Vec<SurveyAnswer>,
) -> SyncResult<()> {
    store
        .delete_entity(site_id, COMPONENT, survey_id, user_id)
        .await?;

    store
        .insert(PendingAction {
            site_id: site_id.to_string(),
            component: COMPONENT.to_string(),
            entity_id: survey_id,
            user_id,
            group_id: 0,
            course_id,
            item_key: String::new(),
            title: name.to_string(),
            created_at: Utc::now().timestamp(),
            deleting: false,
            payload: serde_json::to_value(SurveyAnswers { answers })?,
        })
        .await
}

pub struct SurveySyncHandler {
    store: Arc<dyn PendingStore>,
    remote: Arc<dyn SurveyRemote>,
}

impl SurveySyncHandler {
    pub fn new(store: Arc<dyn PendingStore>, remote: Arc<dyn SurveyRemote>) -> Self {
        Self { store, remote }
    }
}

#[async_trait]
impl ActivityHandler for SurveySyncHandler {
    type Extra = ();

    fn component(&self) -> &'static str {
        COMPONENT
    }

    fn display_name(&self) -> &'static str {
        "survey"
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
        let payload: SurveyAnswers = action.payload_as()?;

        self.remote
            .submit_answers_online(action.entity_id, &payload.answers, site_id)
            .await?;

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
    use sync_engine::SyncEngine;

    fn answers() -> Vec<SurveyAnswer> {
        vec![
            SurveyAnswer {
                key: "q1".to_string(),
                value: "4".to_string(),
            },
            SurveyAnswer {
                key: "q2".to_string(),
                value: "2".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn test_queued_answers_are_submitted_and_cleared() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_answers(store.as_ref(), "site1", 5, 10, 7, "Attitudes survey", answers())
            .await
            .unwrap();

        let mut remote = MockSurveyRemote::new();
        remote
            .expect_submit_answers_online()
            .withf(|survey_id, answers, site_id| {
                *survey_id == 5 && answers.len() == 2 && site_id == "site1"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let engine = SyncEngine::new(
            SurveySyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );

        let outcome = engine
            .sync_entity(SyncScope::entity_user(5, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert!(outcome.warnings.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_answers_are_discarded_with_warning() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_answers(store.as_ref(), "site1", 5, 10, 7, "Attitudes survey", answers())
            .await
            .unwrap();

        let mut remote = MockSurveyRemote::new();
        remote
            .expect_submit_answers_online()
            .times(1)
            .returning(|_, _, _| Err(SyncError::ServerRejection("Already answered".to_string())));

        let engine = SyncEngine::new(
            SurveySyncHandler::new(store.clone(), Arc::new(remote)),
            testing::services(),
        );

        let outcome = engine
            .sync_entity(SyncScope::entity_user(5, 7), None)
            .await
            .unwrap();

        assert!(outcome.updated);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("Attitudes survey"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_editing_replaces_previous_answer_set() {
        let store = Arc::new(MemoryPendingStore::new());
        queue_answers(store.as_ref(), "site1", 5, 10, 7, "Attitudes survey", answers())
            .await
            .unwrap();
        queue_answers(
            store.as_ref(),
            "site1",
            5,
            10,
            7,
            "Attitudes survey",
            vec![SurveyAnswer {
                key: "q1".to_string(),
                value: "5".to_string(),
            }],
        )
        .await
        .unwrap();

        assert_eq!(store.len(), 1);
        let actions = store.list_component("site1", COMPONENT).await.unwrap();
        let payload: SurveyAnswers = actions[0].payload_as().unwrap();
        assert_eq!(payload.answers.len(), 1);
        assert_eq!(payload.answers[0].value, "5");
    }
}
