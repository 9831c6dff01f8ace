// shift_store.rs — The authoritative schedule, tagged with a version.
//
// The version increments exactly once per accepted write. Writers go through
// `compare_and_swap_week`, which checks the caller's expected version and
// replaces one week's shifts in a single critical section. That check is the
// only serialization point between concurrent sessions.

use std::sync::RwLock;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChangeSetError;
use crate::rule::ensure_unique_keys;
use crate::shift::{Shift, ShiftId};

/// A read-only copy of the schedule at one version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub schedule_version: u64,
    pub shifts: Vec<Shift>,
}

impl ScheduleSnapshot {
    /// Shifts dated within `[start, end]`, in store order.
    pub fn week(&self, (start, end): (NaiveDate, NaiveDate)) -> Vec<Shift> {
        self.shifts
            .iter()
            .filter(|s| s.date >= start && s.date <= end)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct Schedule {
    shifts: Vec<Shift>,
    version: u64,
    next_id: ShiftId,
}

impl Schedule {
    fn assign_ids(&mut self, shifts: &mut [Shift]) {
        for shift in shifts.iter_mut().filter(|s| s.id.is_none()) {
            self.next_id += 1;
            shift.id = Some(self.next_id);
        }
    }
}

/// Holds the current schedule. Shared across sessions behind an `Arc`.
#[derive(Debug, Default)]
pub struct ShiftStore {
    schedule: RwLock<Schedule>,
}

impl ShiftStore {
    /// An empty store at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every shift plus the version they belong to.
    pub fn snapshot(&self) -> Result<ScheduleSnapshot, ChangeSetError> {
        let schedule = self
            .schedule
            .read()
            .map_err(|e| ChangeSetError::LockPoisoned(format!("shift store: {}", e)))?;
        Ok(ScheduleSnapshot {
            schedule_version: schedule.version,
            shifts: schedule.shifts.clone(),
        })
    }

    pub fn version(&self) -> Result<u64, ChangeSetError> {
        let schedule = self
            .schedule
            .read()
            .map_err(|e| ChangeSetError::LockPoisoned(format!("shift store: {}", e)))?;
        Ok(schedule.version)
    }

    /// Replace the whole schedule (e.g., with an optimizer baseline).
    ///
    /// Shifts without an id get one. Returns the new version.
    pub fn load(&self, mut shifts: Vec<Shift>) -> Result<u64, ChangeSetError> {
        ensure_unique_keys(&shifts)?;
        let mut schedule = self
            .schedule
            .write()
            .map_err(|e| ChangeSetError::LockPoisoned(format!("shift store: {}", e)))?;
        if let Some(max) = shifts.iter().filter_map(|s| s.id).max() {
            schedule.next_id = schedule.next_id.max(max);
        }
        schedule.assign_ids(&mut shifts);
        schedule.shifts = shifts;
        schedule.version += 1;
        tracing::info!(
            version = schedule.version,
            shifts = schedule.shifts.len(),
            "loaded schedule"
        );
        Ok(schedule.version)
    }

    /// Replace the shifts of one week if the store is still at `expected`.
    ///
    /// Fails with [`ChangeSetError::StaleChangeSet`] when another write got
    /// there first, leaving the schedule untouched. Returns the new version.
    pub fn compare_and_swap_week(
        &self,
        change_set_id: Uuid,
        expected: u64,
        (start, end): (NaiveDate, NaiveDate),
        replacement: &[Shift],
    ) -> Result<u64, ChangeSetError> {
        let mut schedule = self
            .schedule
            .write()
            .map_err(|e| ChangeSetError::LockPoisoned(format!("shift store: {}", e)))?;

        if schedule.version != expected {
            return Err(ChangeSetError::StaleChangeSet {
                change_set_id,
                expected,
                current: schedule.version,
            });
        }
        if let Some(outside) = replacement.iter().find(|s| s.date < start || s.date > end) {
            return Err(ChangeSetError::conflict(format!(
                "shift on {} is outside week {}..{}",
                outside.date, start, end
            )));
        }

        let mut next: Vec<Shift> = schedule
            .shifts
            .iter()
            .filter(|s| s.date < start || s.date > end)
            .cloned()
            .collect();
        let mut incoming = replacement.to_vec();
        schedule.assign_ids(&mut incoming);
        next.extend(incoming);
        ensure_unique_keys(&next)?;

        schedule.shifts = next;
        schedule.version += 1;
        Ok(schedule.version)
    }
}
