use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error enum for the sync core.
///
/// The variants mirror the failure semantics the engine relies on: transient
/// errors propagate so schedulers retry later, semantic rejections are
/// terminal for the affected item, bookkeeping errors are swallowed at the
/// call site.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum SyncError {
    /// No connectivity or the request never reached the server
    #[error("Network error: {0}")]
    Connectivity(String),

    /// The web service explicitly rejected the content (validation,
    /// permission). Retrying can never succeed.
    #[error("Server rejected the request: {0}")]
    ServerRejection(String),

    /// An advisory sync block is held for this identifier
    #[error("Sync blocked: {activity} is being edited")]
    Blocked {
        /// Human-readable activity name for the message, e.g. `glossary`
        activity: String,
    },

    /// Local storage (offline store, sync-time table) errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed payloads, unknown identifiers, misuse of the API
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Anything else, already rendered to a message
    #[error("Error: {0}")]
    Other(String),
}

impl SyncError {
    /// Whether this error is a semantic web-service rejection.
    ///
    /// This is the load-bearing discriminant of the replay loop: rejections
    /// discard the queued action, everything else aborts the run so it can be
    /// retried later.
    pub fn is_server_rejection(&self) -> bool {
        matches!(self, Self::ServerRejection(_))
    }

    /// Whether this error is transient and the caller should retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Blocked { .. })
    }

    /// Build a connectivity error from any displayable cause.
    pub fn connectivity(cause: impl std::fmt::Display) -> Self {
        Self::Connectivity(cause.to_string())
    }

    /// Build a storage error from any displayable cause.
    pub fn storage(cause: impl std::fmt::Display) -> Self {
        Self::Storage(cause.to_string())
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(error: anyhow::Error) -> Self {
        Self::Other(error.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidOperation(format!("payload serialization failed: {error}"))
    }
}

/// Result type alias for sync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Async logging function for errors
pub async fn log_error(context: &str, error: &SyncError) {
    tracing::error!(
        context = context,
        error = %error,
        "sync error occurred"
    );
}
