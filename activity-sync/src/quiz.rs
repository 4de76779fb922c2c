//! Quiz activity sync.
//!
//! Quizzes are attempt-based: offline answers only make sense against the
//! attempt they were given in, and the server advances a per-question
//! sequence check every time a question is processed. Before replay the
//! handler fetches the online attempt state; a finished or deleted attempt
//! discards all offline answers, a stale sequence check discards that one
//! question. Surviving answers are merged into a single attempt upload,
//! finished server-side when the user finished the attempt offline and
//! nothing had to be dropped.

use async_trait::async_trait;
use chrono::Utc;
use error_common::SyncResult;
use offline_store::{EntityFilter, PendingAction, PendingStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use sync_engine::{ActivityHandler, Reconciliation, Submitted, SyncOutcome, SyncScope};

pub const COMPONENT: &str = "mod_quiz";

pub const ATTEMPT_FINISHED: &str = "finished";

/// One question answered offline, stored per slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSlotAnswer {
    pub attempt_id: i64,
    pub slot: i64,
    /// Sequence check the question had when answered offline
    pub sequence_check: i64,
    /// Whether the user finished the attempt offline
    #[serde(default)]
    pub finished: bool,
    /// Wire fields of the answer, e.g. `q55:1_answer`
    pub answers: BTreeMap<String, String>,
}

/// The merged upload reconciliation produces for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptUpload {
    pub attempt_id: i64,
    pub finish: bool,
    pub data: BTreeMap<String, String>,
}

/// Online attempt summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineAttempt {
    pub id: i64,
    pub state: String,
}

/// Online question state within an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineQuestion {
    pub slot: i64,
    pub sequence_check: i64,
}

/// Per-run extras reported alongside the generic outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizExtra {
    /// Whether the attempt is finished on the server after the run
    pub attempt_finished: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuizRemote: Send + Sync {
    async fn get_user_attempts(
        &self,
        quiz_id: i64,
        user_id: i64,
        site_id: &str,
    ) -> SyncResult<Vec<OnlineAttempt>>;

    async fn get_attempt_questions(
        &self,
        attempt_id: i64,
        site_id: &str,
    ) -> SyncResult<Vec<OnlineQuestion>>;

    /// Upload answers into the attempt, optionally finishing it.
    async fn process_attempt_online(
        &self,
        attempt_id: i64,
        data: &BTreeMap<String, String>,
        finish: bool,
        site_id: &str,
    ) -> SyncResult<()>;
}

/// Queue one question's answer while offline, replacing a previous answer to
/// the same slot.
#[allow(clippy::too_many_arguments)]
pub async fn queue_slot_answer(
    store: &dyn PendingStore,
    site_id: &str,
    quiz_id: i64,
    course_id: i64,
    user_id: i64,
    name: &str,
    answer: QuizSlotAnswer,
) -> SyncResult<()> {
    let item_key = format!("slot{}", answer.slot);

    let queued = store
        .list_entity(
            site_id,
            COMPONENT,
            &EntityFilter::entity_user(quiz_id, user_id),
        )
        .await?;
    for action in queued {
        if action.item_key == item_key {
            store.delete(&action.key()).await?;
        }
    }

    store
        .insert(PendingAction {
            site_id: site_id.to_string(),
            component: COMPONENT.to_string(),
            entity_id: quiz_id,
            user_id,
            group_id: 0,
            course_id,
            item_key,
            title: name.to_string(),
            created_at: Utc::now().timestamp(),
            deleting: false,
            payload: serde_json::to_value(answer)?,
        })
        .await
}

pub struct QuizSyncHandler {
    store: Arc<dyn PendingStore>,
    remote: Arc<dyn QuizRemote>,
}

impl QuizSyncHandler {
    pub fn new(store: Arc<dyn PendingStore>, remote: Arc<dyn QuizRemote>) -> Self {
        Self { store, remote }
    }
}

#[async_trait]
impl ActivityHandler for QuizSyncHandler {
    type Extra = QuizExtra;

    fn component(&self) -> &'static str {
        COMPONENT
    }

    fn display_name(&self) -> &'static str {
        "quiz"
    }

    fn sync_identifier(&self, scope: &SyncScope) -> String {
        // One attempt at a time per quiz, whoever triggers the sync.
        scope.entity_id.to_string()
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
        scope: &SyncScope,
        pending: Vec<PendingAction>,
        outcome: &mut SyncOutcome<QuizExtra>,
        site_id: &str,
    ) -> SyncResult<Reconciliation> {
        let slots: Vec<(PendingAction, QuizSlotAnswer)> = pending
            .iter()
            .map(|action| Ok((action.clone(), action.payload_as::<QuizSlotAnswer>()?)))
            .collect::<SyncResult<_>>()?;

        let (attempt_id, title, course_id) = match slots.first() {
            Some((action, answer)) => (answer.attempt_id, action.title.clone(), action.course_id),
            None => return Ok(Reconciliation::default()),
        };

        let attempts = self
            .remote
            .get_user_attempts(scope.entity_id, scope.user_id, site_id)
            .await?;
        let online = attempts.iter().find(|attempt| attempt.id == attempt_id);

        if online.map_or(true, |attempt| attempt.state == ATTEMPT_FINISHED) {
            // Another client finished (or the server dropped) the attempt
            // while this one was offline; the answers have nowhere to go.
            outcome.discard_with_warning(
                "quiz",
                &title,
                "Attempt finished or no longer exists on the server",
            );
            return Ok(Reconciliation::discard_all(pending));
        }

        let questions = self
            .remote
            .get_attempt_questions(attempt_id, site_id)
            .await?;
        let online_checks: BTreeMap<i64, i64> = questions
            .iter()
            .map(|question| (question.slot, question.sequence_check))
            .collect();

        let mut plan = Reconciliation::default();
        let mut data = BTreeMap::new();
        let mut finish_requested = false;
        let mut min_created = i64::MAX;

        for (action, answer) in slots {
            let online_check = online_checks.get(&answer.slot).copied();

            if online_check.map_or(true, |check| check != answer.sequence_check) {
                // The server already processed this question again; the
                // offline answer is stale.
                outcome.discard_with_warning(
                    "quiz",
                    &title,
                    &format!("The answer to question {} was out of date", answer.slot),
                );
                plan.discard.push(action);
                continue;
            }

            data.extend(answer.answers);
            data.insert(
                format!("q{attempt_id}:{}_:sequencecheck", answer.slot),
                answer.sequence_check.to_string(),
            );
            finish_requested |= answer.finished;
            min_created = min_created.min(action.created_at);
        }

        if data.is_empty() {
            return Ok(plan);
        }

        // Only finish the attempt when every offline answer made it through;
        // finishing on top of dropped answers would lock in the wrong state.
        let upload = AttemptUpload {
            attempt_id,
            finish: finish_requested && plan.discard.is_empty(),
            data,
        };

        plan.replay.push(PendingAction {
            site_id: site_id.to_string(),
            component: COMPONENT.to_string(),
            entity_id: scope.entity_id,
            user_id: scope.user_id,
            group_id: 0,
            course_id,
            item_key: String::new(),
            title,
            created_at: min_created,
            deleting: false,
            payload: serde_json::to_value(upload)?,
        });

        Ok(plan)
    }

    async fn submit(&self, action: &PendingAction, site_id: &str) -> SyncResult<Submitted> {
        let upload: AttemptUpload = action.payload_as()?;

        self.remote
            .process_attempt_online(upload.attempt_id, &upload.data, upload.finish, site_id)
            .await?;

        Ok(Submitted::default())
    }

    async fn remove_pending(&self, action: &PendingAction, site_id: &str) -> SyncResult<()> {
        if action.item_key.is_empty() {
            // The merged upload stands in for every remaining slot row.
            self.store
                .delete_entity(site_id, COMPONENT, action.entity_id, action.user_id)
                .await
        } else {
            self.store.delete(&action.key()).await
        }
    }

    async fn after_replay(
        &self,
        scope: &SyncScope,
        outcome: &mut SyncOutcome<QuizExtra>,
        site_id: &str,
    ) -> SyncResult<()> {
        if !outcome.updated {
            return Ok(());
        }

        // Re-read the attempt state so callers can navigate to the review
        // page when the attempt got finished. Read-only, so a failure does
        // not undo the sync.
        match self
            .remote
            .get_user_attempts(scope.entity_id, scope.user_id, site_id)
            .await
        {
            Ok(attempts) => {
                outcome.extra.attempt_finished = attempts
                    .iter()
                    .any(|attempt| attempt.state == ATTEMPT_FINISHED);
            }
            Err(error) => {
                tracing::debug!(%error, "could not re-read attempt state, ignoring");
            }
        }

        Ok(())
    }
}
