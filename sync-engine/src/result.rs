use serde::{Deserialize, Serialize};

/// An item created on the server during a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedItem {
    /// Server-assigned id
    pub item_id: i64,
    pub title: String,
}

/// Local data discarded during a sync run, either because the server
/// rejected it or because reconciliation found it stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardedItem {
    pub title: String,
    pub reason: String,
}

/// Outcome of one sync run.
///
/// `E` carries activity-specific fields (e.g. whether a quiz attempt got
/// finished); activities with nothing extra use `()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOutcome<E> {
    /// Human-readable, non-fatal issues (discarded data)
    pub warnings: Vec<String>,

    /// Whether any server state was changed by this run
    pub updated: bool,

    /// Items that got a server id during the run
    pub created: Vec<CreatedItem>,

    /// Local data dropped during the run
    pub discarded: Vec<DiscardedItem>,

    /// Activity-specific extras
    pub extra: E,
}

impl<E> SyncOutcome<E> {
    /// Record a discard with the standard user-facing warning.
    pub fn discard_with_warning(&mut self, activity: &str, title: &str, reason: &str) {
        self.warnings
            .push(offline_data_deleted(activity, title, reason));
        self.discarded.push(DiscardedItem {
            title: title.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// The warning shown when queued offline data had to be thrown away.
pub fn offline_data_deleted(activity: &str, title: &str, reason: &str) -> String {
    format!("{activity} '{title}' could not be synchronised and was deleted. {reason}")
}
