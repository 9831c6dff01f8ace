//! # rota-changeset
//!
//! The adjustment change-set engine for weekly staff rosters.
//!
//! An [`AdjustmentRule`] is materialized against the week's shifts, the
//! [`diff`] engine turns before/after into deltas, and the result is held as
//! an immutable [`ChangeSet`] tagged with the schedule version it was computed
//! against. [`ChangeSetStore::apply`] commits it through a compare-and-swap on
//! that version; [`ChangeSetStore::rollback`] restores the before-collection
//! the same way.

pub mod audit;
pub mod baseline;
pub mod changeset;
pub mod diff;
pub mod error;
pub mod events;
pub mod external;
pub mod roster;
pub mod rule;
pub mod shift;
pub mod shift_store;
pub mod store;

pub use audit::{AuditAction, AuditEntry, AuditLog};
pub use baseline::generate_baseline;
pub use changeset::{ChangeSet, ChangeSetRecord, ChangeSetState, Preview, VoidReason};
pub use diff::{diff, ShiftDiff};
pub use error::ChangeSetError;
pub use events::{EventDispatcher, LogSink, NotificationSink, ScheduleEvent};
pub use external::{
    Candidate, OptimizationStatus, OptimizeRequest, OptimizeResponse, Optimizer, ParseRequest,
    ParseResponse, RankRequest, RuleParser, SuggestionRanker,
};
pub use roster::{Employee, NameMatch, Roster};
pub use rule::AdjustmentRule;
pub use shift::{week_range_containing, EmployeeId, Shift, ShiftId, ShiftKey, ShiftUpdate, TimeSlot};
pub use shift_store::{ScheduleSnapshot, ShiftStore};
pub use store::{ApplyReceipt, ChangeSetStore, RollbackReceipt};
