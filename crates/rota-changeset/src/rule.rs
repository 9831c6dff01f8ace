// rule.rs — Adjustment rules and their materialization.
//
// A rule is a normalized edit intent produced by the parser or by structured
// input. Each action kind is a pure function (baseline, rule) → after-collection
// that fails with RuleConflict when the rule references a shift or employee
// that does not exist.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ChangeSetError;
use crate::roster::Roster;
use crate::shift::{EmployeeId, Shift, TimeSlot};

/// A normalized edit intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdjustmentRule {
    /// The employee is absent: every shift they hold on `date` is removed.
    Absence {
        employee_id: EmployeeId,
        date: NaiveDate,
    },

    /// Move the employee's shift from one window to another on the same date.
    ChangeTime {
        employee_id: EmployeeId,
        date: NaiveDate,
        from_slot: TimeSlot,
        to_slot: TimeSlot,
    },

    /// Exchange two employees' shifts on `date`. `employee_a` works `slot`;
    /// `employee_b` works `counterpart_slot` (defaults to `slot`).
    Swap {
        employee_a: EmployeeId,
        employee_b: EmployeeId,
        date: NaiveDate,
        slot: TimeSlot,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        counterpart_slot: Option<TimeSlot>,
    },

    /// Add a shift for the employee if they are not already on that window.
    AddShift {
        employee_id: EmployeeId,
        date: NaiveDate,
        slot: TimeSlot,
    },

    /// Cancel one existing assignment.
    CancelRequest {
        employee_id: EmployeeId,
        date: NaiveDate,
        slot: TimeSlot,
    },
}

impl AdjustmentRule {
    /// The action name as it appears on the wire.
    pub fn action(&self) -> &'static str {
        match self {
            AdjustmentRule::Absence { .. } => "absence",
            AdjustmentRule::ChangeTime { .. } => "change_time",
            AdjustmentRule::Swap { .. } => "swap",
            AdjustmentRule::AddShift { .. } => "add_shift",
            AdjustmentRule::CancelRequest { .. } => "cancel_request",
        }
    }

    /// The date the rule targets; it determines the week of the change-set.
    pub fn date(&self) -> NaiveDate {
        match self {
            AdjustmentRule::Absence { date, .. }
            | AdjustmentRule::ChangeTime { date, .. }
            | AdjustmentRule::Swap { date, .. }
            | AdjustmentRule::AddShift { date, .. }
            | AdjustmentRule::CancelRequest { date, .. } => *date,
        }
    }

    /// Every employee the rule references.
    pub fn employees(&self) -> Vec<EmployeeId> {
        match self {
            AdjustmentRule::Swap {
                employee_a,
                employee_b,
                ..
            } => vec![*employee_a, *employee_b],
            AdjustmentRule::Absence { employee_id, .. }
            | AdjustmentRule::ChangeTime { employee_id, .. }
            | AdjustmentRule::AddShift { employee_id, .. }
            | AdjustmentRule::CancelRequest { employee_id, .. } => vec![*employee_id],
        }
    }

    /// Run the rule against `baseline` and return the after-collection.
    ///
    /// The baseline is not modified. Shift order is preserved; added shifts
    /// go to the end.
    pub fn materialize(
        &self,
        baseline: &[Shift],
        roster: &Roster,
    ) -> Result<Vec<Shift>, ChangeSetError> {
        for employee_id in self.employees() {
            if !roster.contains(employee_id) {
                return Err(ChangeSetError::conflict(format!(
                    "employee {} is not in the active roster",
                    employee_id
                )));
            }
        }

        let after = match self {
            AdjustmentRule::Absence { employee_id, date } => absence(baseline, *employee_id, *date),
            AdjustmentRule::ChangeTime {
                employee_id,
                date,
                from_slot,
                to_slot,
            } => change_time(baseline, *employee_id, *date, *from_slot, *to_slot),
            AdjustmentRule::Swap {
                employee_a,
                employee_b,
                date,
                slot,
                counterpart_slot,
            } => swap(
                baseline,
                (*employee_a, *slot),
                (*employee_b, counterpart_slot.unwrap_or(*slot)),
                *date,
            ),
            AdjustmentRule::AddShift {
                employee_id,
                date,
                slot,
            } => add_shift(baseline, *employee_id, *date, *slot),
            AdjustmentRule::CancelRequest {
                employee_id,
                date,
                slot,
            } => cancel(baseline, *employee_id, *date, *slot),
        }?;

        ensure_unique_keys(&after).map_err(|e| ChangeSetError::conflict(e.to_string()))?;
        Ok(after)
    }
}

impl fmt::Display for AdjustmentRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjustmentRule::Absence { employee_id, date } => {
                write!(f, "absence: employee {} on {}", employee_id, date)
            }
            AdjustmentRule::ChangeTime {
                employee_id,
                date,
                from_slot,
                to_slot,
            } => write!(
                f,
                "change_time: employee {} on {} from {} to {}",
                employee_id, date, from_slot, to_slot
            ),
            AdjustmentRule::Swap {
                employee_a,
                employee_b,
                date,
                slot,
                counterpart_slot,
            } => write!(
                f,
                "swap: employee {} ({}) with employee {} ({}) on {}",
                employee_a,
                slot,
                employee_b,
                counterpart_slot.unwrap_or(*slot),
                date
            ),
            AdjustmentRule::AddShift {
                employee_id,
                date,
                slot,
            } => write!(f, "add_shift: employee {} on {} at {}", employee_id, date, slot),
            AdjustmentRule::CancelRequest {
                employee_id,
                date,
                slot,
            } => write!(
                f,
                "cancel_request: employee {} on {} at {}",
                employee_id, date, slot
            ),
        }
    }
}

/// Fail with [`ChangeSetError::DuplicateShift`] if two shifts share a key.
pub fn ensure_unique_keys(shifts: &[Shift]) -> Result<(), ChangeSetError> {
    let mut seen = HashSet::with_capacity(shifts.len());
    for shift in shifts {
        if !seen.insert(shift.key()) {
            return Err(ChangeSetError::DuplicateShift {
                employee_id: shift.employee_id,
                date: shift.date.to_string(),
                start_time: shift.start_time.format("%H:%M").to_string(),
            });
        }
    }
    Ok(())
}

fn position(
    shifts: &[Shift],
    employee_id: EmployeeId,
    date: NaiveDate,
    slot: TimeSlot,
) -> Option<usize> {
    shifts
        .iter()
        .position(|s| s.is_on(employee_id, date) && s.start_time == slot.start_time())
}

fn require(
    shifts: &[Shift],
    employee_id: EmployeeId,
    date: NaiveDate,
    slot: TimeSlot,
) -> Result<usize, ChangeSetError> {
    position(shifts, employee_id, date, slot).ok_or_else(|| {
        ChangeSetError::conflict(format!(
            "employee {} has no {} shift on {}",
            employee_id, slot, date
        ))
    })
}

fn absence(
    baseline: &[Shift],
    employee_id: EmployeeId,
    date: NaiveDate,
) -> Result<Vec<Shift>, ChangeSetError> {
    let after: Vec<Shift> = baseline
        .iter()
        .filter(|s| !s.is_on(employee_id, date))
        .cloned()
        .collect();
    if after.len() == baseline.len() {
        return Err(ChangeSetError::conflict(format!(
            "employee {} has no shift on {}",
            employee_id, date
        )));
    }
    Ok(after)
}

fn change_time(
    baseline: &[Shift],
    employee_id: EmployeeId,
    date: NaiveDate,
    from: TimeSlot,
    to: TimeSlot,
) -> Result<Vec<Shift>, ChangeSetError> {
    if from == to {
        return Err(ChangeSetError::conflict(format!(
            "shift is already in slot {}",
            to
        )));
    }
    let i = require(baseline, employee_id, date, from)?;
    if position(baseline, employee_id, date, to).is_some() {
        return Err(ChangeSetError::conflict(format!(
            "employee {} already works {} on {}",
            employee_id, to, date
        )));
    }
    let mut after = baseline.to_vec();
    after[i].move_to(to);
    Ok(after)
}

fn swap(
    baseline: &[Shift],
    (employee_a, slot_a): (EmployeeId, TimeSlot),
    (employee_b, slot_b): (EmployeeId, TimeSlot),
    date: NaiveDate,
) -> Result<Vec<Shift>, ChangeSetError> {
    if employee_a == employee_b {
        return Err(ChangeSetError::conflict(
            "swap needs two different employees",
        ));
    }
    let a = require(baseline, employee_a, date, slot_a)?;
    let b = require(baseline, employee_b, date, slot_b)?;
    let mut after = baseline.to_vec();
    after[a].employee_id = employee_b;
    after[b].employee_id = employee_a;
    Ok(after)
}

fn add_shift(
    baseline: &[Shift],
    employee_id: EmployeeId,
    date: NaiveDate,
    slot: TimeSlot,
) -> Result<Vec<Shift>, ChangeSetError> {
    if position(baseline, employee_id, date, slot).is_some() {
        return Err(ChangeSetError::conflict(format!(
            "employee {} already works {} on {}",
            employee_id, slot, date
        )));
    }
    let mut after = baseline.to_vec();
    after.push(Shift::new(employee_id, date, slot));
    Ok(after)
}

fn cancel(
    baseline: &[Shift],
    employee_id: EmployeeId,
    date: NaiveDate,
    slot: TimeSlot,
) -> Result<Vec<Shift>, ChangeSetError> {
    let i = require(baseline, employee_id, date, slot)?;
    let mut after = baseline.to_vec();
    after.remove(i);
    Ok(after)
}
