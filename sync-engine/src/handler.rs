use crate::result::SyncOutcome;
use async_trait::async_trait;
use error_common::SyncResult;
use offline_store::PendingAction;

/// The unit of sync work: one owning entity plus the user (and group) whose
/// queued actions are being replayed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SyncScope {
    /// Activity instance id
    pub entity_id: i64,

    /// Acting user; 0 means "resolve to the current user"
    pub user_id: i64,

    /// Group scope, 0 when the activity has no group mode
    pub group_id: i64,

    /// Course the entity belongs to, 0 when unknown
    pub course_id: i64,
}

impl SyncScope {
    pub fn entity_user(entity_id: i64, user_id: i64) -> Self {
        Self {
            entity_id,
            user_id,
            ..Self::default()
        }
    }
}

/// What reconciliation decided to do with the queued actions.
///
/// `discard` entries are deleted by the engine without being submitted;
/// the hook that produced them is responsible for pushing any warning (a
/// whole discarded attempt gets one warning, not one per action).
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Actions to replay, in order
    pub replay: Vec<PendingAction>,

    /// Stale actions to delete unsent
    pub discard: Vec<PendingAction>,
}

impl Reconciliation {
    pub fn replay_all(pending: Vec<PendingAction>) -> Self {
        Self {
            replay: pending,
            discard: Vec::new(),
        }
    }

    pub fn discard_all(pending: Vec<PendingAction>) -> Self {
        Self {
            replay: Vec::new(),
            discard: pending,
        }
    }
}

/// Confirmation of one successful remote submit.
#[derive(Debug, Clone, Default)]
pub struct Submitted {
    /// Server id assigned to newly-created content, when applicable
    pub item_id: Option<i64>,
}

impl Submitted {
    pub fn created(item_id: i64) -> Self {
        Self {
            item_id: Some(item_id),
        }
    }
}

/// Per-activity hooks the engine template is parameterized with.
///
/// A handler owns the activity's offline store access and its remote
/// service; the engine owns the protocol. Implementations must be stateless
/// across runs: anything a run needs to carry between hooks goes in the
/// outcome's `extra` field.
#[async_trait]
pub trait ActivityHandler: Send + Sync + 'static {
    /// Activity-specific fields of the sync outcome
    type Extra: Default + Clone + Send + Sync + 'static;

    /// Component name, e.g. `mod_glossary`. Scopes blocks, events and
    /// offline rows.
    fn component(&self) -> &'static str;

    /// Human name used in warnings, e.g. "glossary"
    fn display_name(&self) -> &'static str;

    /// Key scoping the lock and last-sync time of one unit of work
    fn sync_identifier(&self, scope: &SyncScope) -> String {
        format!("{}#{}", scope.entity_id, scope.user_id)
    }

    /// Scope a stored action belongs to; inverse of [`Self::sync_identifier`],
    /// used to deduplicate batch runs
    fn scope_of(&self, action: &PendingAction) -> SyncScope {
        SyncScope {
            entity_id: action.entity_id,
            user_id: action.user_id,
            group_id: action.group_id,
            course_id: action.course_id,
        }
    }

    /// Replay generic offline interaction logs (view counters). Best-effort:
    /// the engine ignores failures.
    async fn sync_logs(&self, _scope: &SyncScope, _site_id: &str) -> SyncResult<()> {
        Ok(())
    }

    /// Queued actions for one scope, in creation order
    async fn load_pending(
        &self,
        scope: &SyncScope,
        site_id: &str,
    ) -> SyncResult<Vec<PendingAction>>;

    /// Every queued action of this component in a site, for batch
    /// enumeration
    async fn load_all_pending(&self, site_id: &str) -> SyncResult<Vec<PendingAction>>;

    /// Reconcile queued actions against current server state before replay.
    /// The default keeps everything; attempt-based activities override this
    /// to drop answers the server has moved past.
    async fn reconcile(
        &self,
        _scope: &SyncScope,
        pending: Vec<PendingAction>,
        _outcome: &mut SyncOutcome<Self::Extra>,
        _site_id: &str,
    ) -> SyncResult<Reconciliation> {
        Ok(Reconciliation::replay_all(pending))
    }

    /// Perform the remote operation for one action (submit or delete,
    /// depending on the action's intent).
    ///
    /// # Errors
    ///
    /// `SyncError::ServerRejection` marks the action as permanently refused:
    /// the engine deletes it and warns. Any other error aborts the run so
    /// the remaining actions are retried later.
    async fn submit(&self, action: &PendingAction, site_id: &str) -> SyncResult<Submitted>;

    /// Delete one queued action and any locally staged files attached to it
    async fn remove_pending(&self, action: &PendingAction, site_id: &str) -> SyncResult<()>;

    /// Runs after the replay loop; attempt-based activities use it to check
    /// whether the attempt got finished server-side.
    async fn after_replay(
        &self,
        _scope: &SyncScope,
        _outcome: &mut SyncOutcome<Self::Extra>,
        _site_id: &str,
    ) -> SyncResult<()> {
        Ok(())
    }

    /// Invalidate cached server data for the entity after an update.
    /// Best-effort: the engine ignores failures.
    async fn invalidate(&self, _scope: &SyncScope, _site_id: &str) -> SyncResult<()> {
        Ok(())
    }
}
