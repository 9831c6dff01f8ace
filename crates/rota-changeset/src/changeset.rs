// changeset.rs — The immutable change-set record and its lifecycle.
//
// A ChangeSet captures one computed difference against the live schedule:
// the rule that produced it, the deltas, and the schedule version it was
// computed against. The version is the basis for conflict detection.
//
// The ChangeSet itself never changes after creation. Its lifecycle state is
// tracked alongside it in a ChangeSetRecord:
//   Proposed → Applied → RolledBack
//   Proposed → Void

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::diff::ShiftDiff;
use crate::error::ChangeSetError;
use crate::rule::AdjustmentRule;
use crate::shift::{Shift, ShiftUpdate};

/// A computed, versioned difference against the schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Unique identifier for this change-set.
    pub id: Uuid,

    /// When the preview was computed.
    pub created_at: DateTime<Utc>,

    /// The rule that produced the deltas.
    pub rule: AdjustmentRule,

    /// Added/removed/updated shifts.
    pub deltas: ShiftDiff,

    /// Size of the edit (number of deltas). Smaller is less disruptive.
    pub score: usize,

    /// Monday of the affected week.
    pub week_start: NaiveDate,

    /// Sunday of the affected week.
    pub week_end: NaiveDate,

    /// Shift store version the diff was computed against.
    pub schedule_version: u64,

    /// SHA-256 of the deltas and the after-collection.
    pub content_hash: String,

    /// Week shifts before the edit (restored on rollback).
    #[serde(skip)]
    baseline: Vec<Shift>,

    /// Week shifts after the edit (written on apply).
    #[serde(skip)]
    proposed: Vec<Shift>,
}

impl ChangeSet {
    /// Build a change-set from a baseline and an after-collection.
    pub fn new(
        rule: AdjustmentRule,
        week: (NaiveDate, NaiveDate),
        schedule_version: u64,
        baseline: Vec<Shift>,
        proposed: Vec<Shift>,
    ) -> Self {
        let deltas = crate::diff::diff(&baseline, &proposed);
        let content_hash = compute_content_hash(&deltas, &proposed);
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            rule,
            score: deltas.len(),
            deltas,
            week_start: week.0,
            week_end: week.1,
            schedule_version,
            content_hash,
            baseline,
            proposed,
        }
    }

    pub fn baseline(&self) -> &[Shift] {
        &self.baseline
    }

    pub fn proposed(&self) -> &[Shift] {
        &self.proposed
    }

    pub fn week(&self) -> (NaiveDate, NaiveDate) {
        (self.week_start, self.week_end)
    }

    /// Verify the content hash matches the stored deltas.
    pub fn verify_hash(&self) -> bool {
        compute_content_hash(&self.deltas, &self.proposed) == self.content_hash
    }
}

fn compute_content_hash(deltas: &ShiftDiff, proposed: &[Shift]) -> String {
    let json = serde_json::to_string(&(deltas, proposed)).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Why a proposal was voided.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoidReason {
    /// A newer preview was requested by the same session.
    Superseded,
    /// The requester discarded it.
    Discarded,
    /// Apply found the schedule had moved on.
    Stale,
}

impl fmt::Display for VoidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoidReason::Superseded => write!(f, "superseded"),
            VoidReason::Discarded => write!(f, "discarded"),
            VoidReason::Stale => write!(f, "stale"),
        }
    }
}

/// The lifecycle state of a change-set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChangeSetState {
    /// Computed and awaiting a decision.
    Proposed,

    /// Committed; the schedule moved to `version`.
    Applied {
        applied_at: DateTime<Utc>,
        version: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        applied_by: Option<String>,
    },

    /// Abandoned without touching the schedule.
    Void { reason: VoidReason },

    /// Committed, then restored; the schedule moved to `version`.
    RolledBack {
        rolled_back_at: DateTime<Utc>,
        version: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rolled_back_by: Option<String>,
    },
}

impl fmt::Display for ChangeSetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeSetState::Proposed => write!(f, "proposed"),
            ChangeSetState::Applied { .. } => write!(f, "applied"),
            ChangeSetState::Void { .. } => write!(f, "void"),
            ChangeSetState::RolledBack { .. } => write!(f, "rolled_back"),
        }
    }
}

impl ChangeSetState {
    /// Valid transitions:
    ///   Proposed → Applied | Void
    ///   Applied → RolledBack
    pub fn can_transition_to(&self, next: &ChangeSetState) -> bool {
        matches!(
            (self, next),
            (ChangeSetState::Proposed, ChangeSetState::Applied { .. })
                | (ChangeSetState::Proposed, ChangeSetState::Void { .. })
                | (ChangeSetState::Applied { .. }, ChangeSetState::RolledBack { .. })
        )
    }

    /// Void and rolled-back records will never change again.
    pub fn is_retired(&self) -> bool {
        matches!(
            self,
            ChangeSetState::Void { .. } | ChangeSetState::RolledBack { .. }
        )
    }
}

/// A change-set plus its lifecycle state and owning session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSetRecord {
    pub change_set: ChangeSet,
    /// The adjustment session that requested the preview, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub state: ChangeSetState,
    pub updated_at: DateTime<Utc>,
}

impl ChangeSetRecord {
    pub fn new(change_set: ChangeSet, session_id: Option<Uuid>) -> Self {
        Self {
            change_set,
            session_id,
            state: ChangeSetState::Proposed,
            updated_at: Utc::now(),
        }
    }

    /// Transition to a new state. Returns an error if the transition is invalid.
    pub fn transition(&mut self, next: ChangeSetState) -> Result<(), ChangeSetError> {
        if !self.state.can_transition_to(&next) {
            return Err(ChangeSetError::InvalidTransition {
                change_set_id: self.change_set.id,
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// What a requester inspects before deciding to apply or discard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preview {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    /// Full after-state of the week.
    pub shifts: Vec<Shift>,
    pub added: Vec<Shift>,
    pub removed: Vec<Shift>,
    pub updated: Vec<ShiftUpdate>,
    pub change_set: ChangeSet,
}

impl From<&ChangeSet> for Preview {
    fn from(cs: &ChangeSet) -> Self {
        Self {
            week_start: cs.week_start,
            week_end: cs.week_end,
            shifts: cs.proposed.clone(),
            added: cs.deltas.added.clone(),
            removed: cs.deltas.removed.clone(),
            updated: cs.deltas.updated.clone(),
            change_set: cs.clone(),
        }
    }
}
