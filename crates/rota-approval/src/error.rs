// error.rs — Error types for the approval workflow.

use rota_changeset::ChangeSetError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("shift change request not found: {0}")]
    NotFound(Uuid),

    /// The request is missing a field its type needs (e.g., swap without a
    /// target employee).
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Engine failure, including `AlreadyDecided` and rule conflicts.
    #[error(transparent)]
    ChangeSet(#[from] ChangeSetError),

    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl ApprovalError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApprovalError::NotFound(_) => "request_not_found",
            ApprovalError::Invalid(_) => "invalid_request",
            ApprovalError::ChangeSet(e) => e.kind(),
            ApprovalError::IoError { .. } => "io",
            ApprovalError::SerializationError(_) => "serialization",
        }
    }
}
