// error.rs — Error types for the change-set engine.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while previewing, applying or rolling back edits.
///
/// None of these are fatal to the process. Each one is scoped to a single
/// request and carries the ids the caller needs to decide retry vs. abandon.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    /// The rule cannot be applied to the current roster or schedule.
    #[error("rule conflict: {reason}")]
    RuleConflict { reason: String },

    /// The schedule moved on since the change-set was computed. Re-preview.
    #[error(
        "change set {change_set_id} was computed against version {expected}, schedule is at {current}"
    )]
    StaleChangeSet {
        change_set_id: Uuid,
        expected: u64,
        current: u64,
    },

    /// Rollback requested for a change-set that was never committed.
    #[error("change set {0} has not been applied")]
    NotApplied(Uuid),

    /// Approve/reject requested for a request that is already decided.
    #[error("request {request_id} is already {status}")]
    AlreadyDecided { request_id: Uuid, status: String },

    /// The optimizer could not satisfy the constraints.
    #[error("optimizer reported infeasible schedule ({} warnings)", warnings.len())]
    Infeasible { warnings: Vec<String> },

    /// No change-set with this id exists.
    #[error("change set not found: {0}")]
    NotFound(Uuid),

    /// Invalid lifecycle transition (e.g., Void → Applied).
    #[error("invalid transition for change set {change_set_id} from {from} to {to}")]
    InvalidTransition {
        change_set_id: Uuid,
        from: String,
        to: String,
    },

    /// Two shifts share an `(employee_id, date, start_time)` key.
    #[error("duplicate shift for employee {employee_id} on {date} at {start_time}")]
    DuplicateShift {
        employee_id: i64,
        date: String,
        start_time: String,
    },

    /// The stored deltas no longer match their content hash.
    #[error("change set {0} failed integrity verification")]
    IntegrityMismatch(Uuid),

    /// A shared lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// An external collaborator (optimizer, parser, ranker) failed.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// A line of the audit log does not link to the one before it.
    #[error("audit chain broken at line {line}")]
    AuditChainBroken { line: usize },

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl ChangeSetError {
    /// Shorthand for a [`ChangeSetError::RuleConflict`].
    pub fn conflict(reason: impl Into<String>) -> Self {
        ChangeSetError::RuleConflict {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind, used as `reason` on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeSetError::RuleConflict { .. } => "rule_conflict",
            ChangeSetError::StaleChangeSet { .. } => "stale_change_set",
            ChangeSetError::NotApplied(_) => "not_applied",
            ChangeSetError::AlreadyDecided { .. } => "already_decided",
            ChangeSetError::Infeasible { .. } => "infeasible",
            ChangeSetError::NotFound(_) => "not_found",
            ChangeSetError::InvalidTransition { .. } => "invalid_transition",
            ChangeSetError::DuplicateShift { .. } => "duplicate_shift",
            ChangeSetError::IntegrityMismatch(_) => "integrity_mismatch",
            ChangeSetError::LockPoisoned(_) => "lock_poisoned",
            ChangeSetError::Collaborator(_) => "collaborator",
            ChangeSetError::AuditChainBroken { .. } => "audit_chain_broken",
            ChangeSetError::IoError { .. } => "io",
            ChangeSetError::SerializationError(_) => "serialization",
        }
    }

    /// Whether the caller should re-preview and try again.
    pub fn is_stale(&self) -> bool {
        matches!(self, ChangeSetError::StaleChangeSet { .. })
    }
}
