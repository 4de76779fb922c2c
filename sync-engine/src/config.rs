use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum seconds between automatic syncs of one identifier. Forced and
    /// user-invoked syncs ignore it.
    pub sync_interval_secs: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 300,
        }
    }
}
