// diff.rs — The diff engine: before/after shift collections → deltas.
//
// Shifts are paired across the two sides in three passes:
//   1. by persistent id (a reassigned or moved shift keeps its id),
//   2. by (employee_id, date, start_time) key,
//   3. by (employee_id, date), so a slot that moved is an update rather
//      than a coincidental add + remove,
//   4. a settle pass that re-pairs any shift whose exact key is still held
//      by an unmatched shift on the other side, so a key never lands in
//      more than one of added/removed/updated.
// Paired shifts whose fields differ are `updated`; unpaired after-shifts are
// `added`, unpaired before-shifts are `removed`.
//
// Output order follows the after-collection for `added`/`updated` and the
// before-collection for `removed`. The function is pure.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::shift::{EmployeeId, Shift, ShiftId, ShiftKey, ShiftUpdate};

/// Added/removed/updated shifts between two collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftDiff {
    pub added: Vec<Shift>,
    pub removed: Vec<Shift>,
    pub updated: Vec<ShiftUpdate>,
}

impl ShiftDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    /// Total number of deltas.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.updated.len()
    }
}

/// Compute the deltas that turn `before` into `after`.
pub fn diff(before: &[Shift], after: &[Shift]) -> ShiftDiff {
    let mut index = BeforeIndex::new(before);
    // partner[j] = index into `before` paired with after[j].
    let mut partner: Vec<Option<usize>> = vec![None; after.len()];

    for (j, shift) in after.iter().enumerate() {
        if let Some(id) = shift.id {
            partner[j] = index.take_by_id(id);
        }
    }
    for (j, shift) in after.iter().enumerate() {
        if partner[j].is_none() {
            partner[j] = index.take_by_key(&shift.key());
        }
    }
    for (j, shift) in after.iter().enumerate() {
        if partner[j].is_none() {
            partner[j] = index.take_by_day(shift.employee_id, shift.date);
        }
    }
    settle(&mut index, after, &mut partner);

    let mut out = ShiftDiff::default();
    for (j, shift) in after.iter().enumerate() {
        match partner[j] {
            Some(i) if same_content(&before[i], shift) => {}
            Some(i) => out.updated.push(ShiftUpdate {
                before: before[i].clone(),
                after: shift.clone(),
            }),
            None => out.added.push(shift.clone()),
        }
    }
    out.removed = index.remaining().cloned().collect();
    out
}

/// Prefer exact-key pairs over id or day pairs until nothing changes.
///
/// A pair whose keys differ is broken when the after-shift's key is still
/// unclaimed on the before side, or the before-shift's key belongs to an
/// unpaired after-shift. Every step adds an exact pair and none removes
/// one, so the loop terminates.
fn settle(index: &mut BeforeIndex<'_>, after: &[Shift], partner: &mut [Option<usize>]) {
    let mut after_by_key: HashMap<ShiftKey, usize> = HashMap::new();
    for (j, shift) in after.iter().enumerate() {
        after_by_key.entry(shift.key()).or_insert(j);
    }

    loop {
        let mut changed = false;
        for (j, shift) in after.iter().enumerate() {
            if partner[j].is_none() {
                if let Some(i) = index.take_by_key(&shift.key()) {
                    partner[j] = Some(i);
                    changed = true;
                }
            }
        }
        for (j, shift) in after.iter().enumerate() {
            let i = match partner[j] {
                Some(i) => i,
                None => continue,
            };
            let before_key = index.shifts[i].key();
            let after_key = shift.key();
            if before_key == after_key {
                continue;
            }
            if let Some(exact) = index.take_by_key(&after_key) {
                index.release(i);
                partner[j] = Some(exact);
                changed = true;
            } else if let Some(&k) = after_by_key.get(&before_key) {
                if partner[k].is_none() {
                    partner[k] = Some(i);
                    partner[j] = None;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

/// Two paired shifts are unchanged when every scheduled field matches. Ids
/// are pairing hints only.
fn same_content(a: &Shift, b: &Shift) -> bool {
    a.employee_id == b.employee_id
        && a.date == b.date
        && a.start_time == b.start_time
        && a.end_time == b.end_time
        && a.break_minutes == b.break_minutes
}

/// Lookup tables over the before-collection, tracking which shifts are
/// already paired.
struct BeforeIndex<'a> {
    shifts: &'a [Shift],
    taken: Vec<bool>,
    by_id: HashMap<ShiftId, usize>,
    by_key: HashMap<ShiftKey, Vec<usize>>,
    by_day: HashMap<(EmployeeId, NaiveDate), Vec<usize>>,
}

impl<'a> BeforeIndex<'a> {
    fn new(shifts: &'a [Shift]) -> Self {
        let mut by_id = HashMap::new();
        let mut by_key: HashMap<ShiftKey, Vec<usize>> = HashMap::new();
        let mut by_day: HashMap<(EmployeeId, NaiveDate), Vec<usize>> = HashMap::new();
        for (i, shift) in shifts.iter().enumerate() {
            if let Some(id) = shift.id {
                by_id.entry(id).or_insert(i);
            }
            by_key.entry(shift.key()).or_default().push(i);
            by_day
                .entry((shift.employee_id, shift.date))
                .or_default()
                .push(i);
        }
        Self {
            shifts,
            taken: vec![false; shifts.len()],
            by_id,
            by_key,
            by_day,
        }
    }

    fn take_by_id(&mut self, id: ShiftId) -> Option<usize> {
        let i = *self.by_id.get(&id)?;
        self.claim(i)
    }

    fn take_by_key(&mut self, key: &ShiftKey) -> Option<usize> {
        let candidates = self.by_key.get(key)?.clone();
        candidates.into_iter().find_map(|i| self.claim(i))
    }

    fn take_by_day(&mut self, employee_id: EmployeeId, date: NaiveDate) -> Option<usize> {
        let candidates = self.by_day.get(&(employee_id, date))?.clone();
        candidates.into_iter().find_map(|i| self.claim(i))
    }

    fn claim(&mut self, i: usize) -> Option<usize> {
        if self.taken[i] {
            return None;
        }
        self.taken[i] = true;
        Some(i)
    }

    fn release(&mut self, i: usize) {
        self.taken[i] = false;
    }

    fn remaining(&self) -> impl Iterator<Item = &'a Shift> + '_ {
        self.shifts
            .iter()
            .zip(self.taken.iter())
            .filter(|(_, taken)| !**taken)
            .map(|(shift, _)| shift)
    }
}
