// error.rs — Error types for adjustment sessions.

use rota_changeset::ChangeSetError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation is not valid in the session's current state
    /// (e.g., apply while idle).
    #[error("session {session_id} cannot {operation} while {state}")]
    InvalidState {
        session_id: Uuid,
        state: String,
        operation: &'static str,
    },

    #[error("session not found: {0}")]
    NotFound(Uuid),

    /// The underlying change-set operation failed.
    #[error(transparent)]
    ChangeSet(#[from] ChangeSetError),
}

impl SessionError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::InvalidState { .. } => "invalid_state",
            SessionError::NotFound(_) => "session_not_found",
            SessionError::ChangeSet(e) => e.kind(),
        }
    }
}
