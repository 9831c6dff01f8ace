// store.rs — The Change-Set Store.
//
// Creates change-sets from rules, commits or voids them, and restores the
// before-collection on rollback. All schedule writes go through the Shift
// Store's compare-and-swap, so a change-set computed against an old version
// can never be committed.
//
// Lock order is records → schedule. `propose` reads the schedule without
// holding the records lock, so previews run in parallel with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::changeset::{ChangeSet, ChangeSetRecord, ChangeSetState, Preview, VoidReason};
use crate::error::ChangeSetError;
use crate::events::{EventDispatcher, ScheduleEvent};
use crate::roster::Roster;
use crate::rule::AdjustmentRule;
use crate::shift::week_range_containing;
use crate::shift_store::ShiftStore;

/// Result of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReceipt {
    pub change_set_id: Uuid,
    /// Schedule version after the commit.
    pub version_id: u64,
    pub applied_at: DateTime<Utc>,
}

/// Result of a successful rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReceipt {
    pub change_set_id: Uuid,
    pub version_id: u64,
    pub rolled_back_at: DateTime<Utc>,
}

/// Shared store of change-set records over one Shift Store.
pub struct ChangeSetStore {
    shifts: Arc<ShiftStore>,
    roster: RwLock<Roster>,
    records: RwLock<HashMap<Uuid, ChangeSetRecord>>,
    dispatcher: EventDispatcher,
    audit: Option<Mutex<AuditLog>>,
}

impl ChangeSetStore {
    pub fn new(shifts: Arc<ShiftStore>, roster: Roster) -> Self {
        Self {
            shifts,
            roster: RwLock::new(roster),
            records: RwLock::new(HashMap::new()),
            dispatcher: EventDispatcher::new(),
            audit: None,
        }
    }

    /// Attach the dispatcher that receives `proposals_ready` / `schedule.updated`.
    pub fn with_dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Record every apply and rollback in `log`.
    pub fn with_audit(mut self, log: AuditLog) -> Self {
        self.audit = Some(Mutex::new(log));
        self
    }

    pub fn shift_store(&self) -> &Arc<ShiftStore> {
        &self.shifts
    }

    pub fn roster(&self) -> Result<Roster, ChangeSetError> {
        let roster = self
            .roster
            .read()
            .map_err(|e| ChangeSetError::LockPoisoned(format!("roster: {}", e)))?;
        Ok(roster.clone())
    }

    pub fn set_roster(&self, roster: Roster) -> Result<(), ChangeSetError> {
        let mut current = self
            .roster
            .write()
            .map_err(|e| ChangeSetError::LockPoisoned(format!("roster: {}", e)))?;
        tracing::info!(employees = roster.len(), "roster replaced");
        *current = roster;
        Ok(())
    }

    /// Compute a preview for `rule` against the current schedule.
    ///
    /// Read-only with respect to the schedule. When `session_id` is given,
    /// the session's previous unapplied proposal is voided as superseded.
    pub fn propose(
        &self,
        session_id: Option<Uuid>,
        rule: AdjustmentRule,
    ) -> Result<Preview, ChangeSetError> {
        let roster = self.roster()?;
        let snapshot = self.shifts.snapshot()?;
        let week = week_range_containing(rule.date());
        let baseline = snapshot.week(week);
        let proposed = rule.materialize(&baseline, &roster)?;
        let change_set = ChangeSet::new(rule, week, snapshot.schedule_version, baseline, proposed);
        let preview = Preview::from(&change_set);
        let change_set_id = change_set.id;

        {
            let mut records = self.write_records()?;
            if let Some(session_id) = session_id {
                for record in records.values_mut().filter(|r| {
                    r.session_id == Some(session_id) && r.state == ChangeSetState::Proposed
                }) {
                    record.transition(ChangeSetState::Void {
                        reason: VoidReason::Superseded,
                    })?;
                    tracing::debug!(
                        change_set_id = %record.change_set.id,
                        session_id = %session_id,
                        "superseded proposal"
                    );
                }
            }
            records.insert(change_set_id, ChangeSetRecord::new(change_set, session_id));
        }

        tracing::info!(
            change_set_id = %change_set_id,
            version = snapshot.schedule_version,
            deltas = preview.change_set.score,
            "proposal ready"
        );
        self.dispatcher
            .dispatch(&ScheduleEvent::ProposalsReady { change_set_id });
        Ok(preview)
    }

    /// Commit a proposed change-set.
    ///
    /// Fails with `StaleChangeSet` (and voids the proposal) when the schedule
    /// is no longer at the version the change-set was computed against.
    pub fn apply(&self, change_set_id: Uuid) -> Result<ApplyReceipt, ChangeSetError> {
        self.apply_as(change_set_id, None)
    }

    /// [`ChangeSetStore::apply`] on behalf of `actor`, who is recorded on the
    /// applied state and in the audit log.
    pub fn apply_as(
        &self,
        change_set_id: Uuid,
        actor: Option<&str>,
    ) -> Result<ApplyReceipt, ChangeSetError> {
        let receipt = {
            let mut records = self.write_records()?;
            let record = records
                .get_mut(&change_set_id)
                .ok_or(ChangeSetError::NotFound(change_set_id))?;
            if record.state != ChangeSetState::Proposed {
                return Err(ChangeSetError::InvalidTransition {
                    change_set_id,
                    from: record.state.to_string(),
                    to: "applied".to_string(),
                });
            }
            if !record.change_set.verify_hash() {
                return Err(ChangeSetError::IntegrityMismatch(change_set_id));
            }

            let cs = &record.change_set;
            let version = match self.shifts.compare_and_swap_week(
                change_set_id,
                cs.schedule_version,
                cs.week(),
                cs.proposed(),
            ) {
                Ok(version) => version,
                Err(e) if e.is_stale() => {
                    record.transition(ChangeSetState::Void {
                        reason: VoidReason::Stale,
                    })?;
                    tracing::warn!(change_set_id = %change_set_id, "apply rejected: {}", e);
                    return Err(e);
                }
                Err(e) => return Err(e),
            };

            let applied_at = Utc::now();
            record.transition(ChangeSetState::Applied {
                applied_at,
                version,
                applied_by: actor.map(str::to_string),
            })?;
            ApplyReceipt {
                change_set_id,
                version_id: version,
                applied_at,
            }
        };

        tracing::info!(change_set_id = %change_set_id, version = receipt.version_id, actor, "change set applied");
        self.record_audit(actor, AuditAction::Apply, change_set_id, receipt.version_id);
        self.dispatcher.dispatch(&ScheduleEvent::ScheduleUpdated {
            change_set_id,
            schedule_version: receipt.version_id,
        });
        Ok(receipt)
    }

    /// Restore the before-collection of an applied change-set.
    ///
    /// Compare-and-restore against the version the apply produced; any later
    /// write makes this `StaleChangeSet`.
    pub fn rollback(&self, change_set_id: Uuid) -> Result<RollbackReceipt, ChangeSetError> {
        self.rollback_as(change_set_id, None)
    }

    /// [`ChangeSetStore::rollback`] on behalf of `actor`.
    pub fn rollback_as(
        &self,
        change_set_id: Uuid,
        actor: Option<&str>,
    ) -> Result<RollbackReceipt, ChangeSetError> {
        let receipt = {
            let mut records = self.write_records()?;
            let record = records
                .get_mut(&change_set_id)
                .ok_or(ChangeSetError::NotFound(change_set_id))?;
            let applied_version = match &record.state {
                ChangeSetState::Applied { version, .. } => *version,
                ChangeSetState::RolledBack { .. } => {
                    return Err(ChangeSetError::InvalidTransition {
                        change_set_id,
                        from: record.state.to_string(),
                        to: "rolled_back".to_string(),
                    })
                }
                _ => return Err(ChangeSetError::NotApplied(change_set_id)),
            };

            let cs = &record.change_set;
            let version = self.shifts.compare_and_swap_week(
                change_set_id,
                applied_version,
                cs.week(),
                cs.baseline(),
            )?;
            let rolled_back_at = Utc::now();
            record.transition(ChangeSetState::RolledBack {
                rolled_back_at,
                version,
                rolled_back_by: actor.map(str::to_string),
            })?;
            RollbackReceipt {
                change_set_id,
                version_id: version,
                rolled_back_at,
            }
        };

        tracing::info!(change_set_id = %change_set_id, version = receipt.version_id, actor, "change set rolled back");
        self.record_audit(actor, AuditAction::Rollback, change_set_id, receipt.version_id);
        self.dispatcher.dispatch(&ScheduleEvent::ScheduleUpdated {
            change_set_id,
            schedule_version: receipt.version_id,
        });
        Ok(receipt)
    }

    /// Void a proposal the requester no longer wants.
    pub fn discard(&self, change_set_id: Uuid) -> Result<(), ChangeSetError> {
        self.void(change_set_id, VoidReason::Discarded)
    }

    /// Void a proposal with an explicit reason.
    pub fn void(&self, change_set_id: Uuid, reason: VoidReason) -> Result<(), ChangeSetError> {
        let mut records = self.write_records()?;
        let record = records
            .get_mut(&change_set_id)
            .ok_or(ChangeSetError::NotFound(change_set_id))?;
        record.transition(ChangeSetState::Void { reason })?;
        tracing::debug!(change_set_id = %change_set_id, reason = %reason, "change set voided");
        Ok(())
    }

    pub fn get(&self, change_set_id: Uuid) -> Result<ChangeSetRecord, ChangeSetError> {
        self.read_records()?
            .get(&change_set_id)
            .cloned()
            .ok_or(ChangeSetError::NotFound(change_set_id))
    }

    /// All records, oldest first. `state` filters by state name
    /// (`proposed`, `applied`, `void`, `rolled_back`).
    pub fn list(&self, state: Option<&str>) -> Result<Vec<ChangeSetRecord>, ChangeSetError> {
        let records = self.read_records()?;
        let mut out: Vec<ChangeSetRecord> = records
            .values()
            .filter(|r| state.map_or(true, |s| r.state.to_string() == s))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.change_set.created_at);
        Ok(out)
    }

    /// Drop void and rolled-back records last touched before `cutoff`.
    /// Returns how many were removed.
    pub fn purge_retired(&self, cutoff: DateTime<Utc>) -> Result<usize, ChangeSetError> {
        let mut records = self.write_records()?;
        let before = records.len();
        records.retain(|_, r| !(r.state.is_retired() && r.updated_at < cutoff));
        let purged = before - records.len();
        if purged > 0 {
            tracing::info!(purged, "purged retired change sets");
        }
        Ok(purged)
    }

    /// The schedule write has already happened, so a failed audit append is
    /// logged rather than returned.
    fn record_audit(
        &self,
        actor: Option<&str>,
        action: AuditAction,
        change_set_id: Uuid,
        schedule_version: u64,
    ) {
        let Some(audit) = &self.audit else { return };
        let mut entry = AuditEntry::new(actor, action, change_set_id, schedule_version);
        let result = match audit.lock() {
            Ok(mut log) => log.append(&mut entry),
            Err(e) => Err(ChangeSetError::LockPoisoned(format!("audit log: {}", e))),
        };
        if let Err(e) = result {
            tracing::error!(change_set_id = %change_set_id, error = %e, "audit append failed");
        }
    }

    fn read_records(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Uuid, ChangeSetRecord>>, ChangeSetError> {
        self.records
            .read()
            .map_err(|e| ChangeSetError::LockPoisoned(format!("change set records: {}", e)))
    }

    fn write_records(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, ChangeSetRecord>>, ChangeSetError> {
        self.records
            .write()
            .map_err(|e| ChangeSetError::LockPoisoned(format!("change set records: {}", e)))
    }
}
