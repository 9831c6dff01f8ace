// workflow.rs — Review of employee shift change requests.
//
// A pending request is previewed through the change-set engine with the
// request id as its session, so re-previewing supersedes the earlier
// proposal. Approval commits the latest proposal (or a fresh one if the
// reviewer never previewed); rejection voids it. Decisions, and the proposal
// step of a preview, are serialized so two reviewers cannot both decide the
// same request and a rejection cannot slip between a preview's pending check
// and its proposal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use rota_changeset::{
    Candidate, ChangeSetError, ChangeSetState, ChangeSetStore, EmployeeId, NameMatch, Preview,
    RankRequest, Roster, Shift, SuggestionRanker, TimeSlot, VoidReason,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApprovalError;
use crate::request::{NewRequest, RequestStatus, ShiftChangeRequest};
use crate::store::RequestStore;

/// Candidates shown per vacated slot unless configured otherwise.
pub const DEFAULT_DISPLAY_CANDIDATES: usize = 2;

/// Fill-in options for one slot a request would leave uncovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub original_employee_id: EmployeeId,
    /// The top of the ranking, for display.
    pub candidates: Vec<Candidate>,
    /// Every eligible employee in rank order.
    pub ranked: Vec<Candidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPreview {
    pub request: ShiftChangeRequest,
    #[serde(flatten)]
    pub preview: Preview,
    pub suggestions: Vec<Suggestion>,
}

pub struct ApprovalWorkflow {
    requests: RequestStore,
    changesets: Arc<ChangeSetStore>,
    ranker: Arc<dyn SuggestionRanker>,
    display_candidates: usize,
    decisions: Mutex<()>,
}

impl ApprovalWorkflow {
    pub fn new(
        requests: RequestStore,
        changesets: Arc<ChangeSetStore>,
        ranker: Arc<dyn SuggestionRanker>,
    ) -> Self {
        Self {
            requests,
            changesets,
            ranker,
            display_candidates: DEFAULT_DISPLAY_CANDIDATES,
            decisions: Mutex::new(()),
        }
    }

    pub fn with_display_candidates(mut self, n: usize) -> Self {
        self.display_candidates = n;
        self
    }

    /// Record a new pending request.
    ///
    /// Names are resolved against the roster; the week containing the
    /// request date and the current schedule version are captured.
    pub fn submit(&self, new: NewRequest) -> Result<ShiftChangeRequest, ApprovalError> {
        let roster = self.changesets.roster()?;
        let employee_id = resolve(&roster, new.employee_id, new.employee_name.as_deref())?
            .ok_or_else(|| ApprovalError::Invalid("employee_id or employee_name is required".into()))?;
        let target_employee_id = resolve(
            &roster,
            new.target_employee_id,
            new.target_employee_name.as_deref(),
        )?;
        let snapshot = self.changesets.shift_store().snapshot()?;
        let (week_start, week_end) = rota_changeset::week_range_containing(new.date);
        let now = Utc::now();

        let request = ShiftChangeRequest {
            id: Uuid::new_v4(),
            kind: new.kind,
            employee_id,
            employee_name: new
                .employee_name
                .or_else(|| roster.get(employee_id).map(|e| e.name.clone())),
            date: new.date,
            from_slot: new.from_slot,
            to_slot: new.to_slot,
            target_employee_id,
            target_employee_name: new.target_employee_name.or_else(|| {
                target_employee_id.and_then(|id| roster.get(id).map(|e| e.name.clone()))
            }),
            reason: new.reason,
            status: RequestStatus::Pending,
            requested_via: new.requested_via,
            external_user_id: new.external_user_id,
            snapshot_week_start: week_start,
            snapshot_week_end: week_end,
            snapshot_version: snapshot.schedule_version,
            change_set_id: None,
            decided_by: None,
            decision_note: None,
            created_at: now,
            updated_at: now,
        };
        // Reject malformed requests at intake rather than at review.
        request.to_rule()?;
        self.requests.save(&request)?;

        tracing::info!(
            request_id = %request.id,
            kind = %request.kind,
            employee_id = request.employee_id,
            date = %request.date,
            "shift change request received"
        );
        Ok(request)
    }

    pub fn get(&self, request_id: Uuid) -> Result<ShiftChangeRequest, ApprovalError> {
        self.requests.require(request_id)
    }

    /// Requests newest first, optionally filtered by status.
    pub fn list(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ShiftChangeRequest>, ApprovalError> {
        match status {
            Some(status) => self.requests.list_by_status(status),
            None => self.requests.list(),
        }
    }

    /// Preview a pending request against the current schedule, with ranked
    /// fill-ins for every slot it would vacate.
    pub async fn preview(&self, request_id: Uuid) -> Result<RequestPreview, ApprovalError> {
        let (request, preview) = {
            let _guard = self.decision_lock()?;
            let request = self.requests.require(request_id)?;
            ensure_pending(&request)?;
            let preview = self
                .changesets
                .propose(Some(request.id), request.to_rule()?)?;
            (request, preview)
        };
        let suggestions = self.suggest(&request, &preview).await?;
        Ok(RequestPreview {
            request,
            preview,
            suggestions,
        })
    }

    /// Approve and commit a pending request.
    ///
    /// On any engine failure (stale schedule, conflict) the request stays
    /// pending and the error is returned. If the decision cannot be saved
    /// after the commit, the commit is rolled back and the request stays
    /// pending.
    pub fn approve(
        &self,
        request_id: Uuid,
        decided_by: Option<String>,
    ) -> Result<ShiftChangeRequest, ApprovalError> {
        let _guard = self.decision_lock()?;
        let mut request = self.requests.require(request_id)?;
        ensure_pending(&request)?;

        let change_set_id = match self.open_proposal(request.id)? {
            Some(id) => id,
            None => {
                self.changesets
                    .propose(Some(request.id), request.to_rule()?)?
                    .change_set
                    .id
            }
        };
        let receipt = self
            .changesets
            .apply_as(change_set_id, decided_by.as_deref())?;

        request.change_set_id = Some(change_set_id);
        let recorded = request
            .decide(RequestStatus::Approved, decided_by.clone(), None)
            .and_then(|()| self.requests.save(&request));
        if let Err(e) = recorded {
            self.undo_apply(request.id, change_set_id, decided_by.as_deref(), &e);
            return Err(e);
        }
        tracing::info!(
            request_id = %request.id,
            change_set_id = %change_set_id,
            version = receipt.version_id,
            "request approved"
        );
        Ok(request)
    }

    /// Reject a pending request. A given reason replaces the stored one.
    pub fn reject(
        &self,
        request_id: Uuid,
        decided_by: Option<String>,
        reason: Option<String>,
    ) -> Result<ShiftChangeRequest, ApprovalError> {
        let _guard = self.decision_lock()?;
        let mut request = self.requests.require(request_id)?;
        ensure_pending(&request)?;

        if let Some(change_set_id) = self.open_proposal(request.id)? {
            self.changesets.void(change_set_id, VoidReason::Discarded)?;
        }
        if reason.is_some() {
            request.reason = reason.clone();
        }
        request.decide(RequestStatus::Rejected, decided_by, reason)?;
        self.requests.save(&request)?;
        tracing::info!(request_id = %request.id, "request rejected");
        Ok(request)
    }

    async fn suggest(
        &self,
        request: &ShiftChangeRequest,
        preview: &Preview,
    ) -> Result<Vec<Suggestion>, ApprovalError> {
        let vacated = vacated_slots(preview);
        if vacated.is_empty() {
            return Ok(Vec::new());
        }

        // The after-state of the week plus everything outside it, so
        // neighbours across the week boundary are visible to the ranker.
        let snapshot = self.changesets.shift_store().snapshot()?;
        let week = (preview.week_start, preview.week_end);
        let mut current: Vec<Shift> = snapshot
            .shifts
            .into_iter()
            .filter(|s| s.date < week.0 || s.date > week.1)
            .collect();
        current.extend(preview.shifts.iter().cloned());
        let roster = self.changesets.roster()?;

        let mut suggestions = Vec::with_capacity(vacated.len());
        for (date, time_slot, original_employee_id) in vacated {
            let ranked = self
                .ranker
                .rank(
                    &RankRequest {
                        date,
                        time_slot,
                        roster: roster.clone(),
                    },
                    &current,
                )
                .await?;
            let ranked: Vec<Candidate> = ranked
                .into_iter()
                .filter(|c| {
                    c.employee_id != original_employee_id && c.employee_id != request.employee_id
                })
                .zip(1u32..)
                .map(|(c, rank)| Candidate { rank, ..c })
                .collect();
            suggestions.push(Suggestion {
                date,
                time_slot,
                original_employee_id,
                candidates: ranked.iter().take(self.display_candidates).cloned().collect(),
                ranked,
            });
        }
        Ok(suggestions)
    }

    fn undo_apply(
        &self,
        request_id: Uuid,
        change_set_id: Uuid,
        actor: Option<&str>,
        cause: &ApprovalError,
    ) {
        match self.changesets.rollback_as(change_set_id, actor) {
            Ok(receipt) => tracing::warn!(
                request_id = %request_id,
                change_set_id = %change_set_id,
                version = receipt.version_id,
                error = %cause,
                "approval not recorded; schedule change rolled back"
            ),
            Err(e) => tracing::error!(
                request_id = %request_id,
                change_set_id = %change_set_id,
                error = %cause,
                rollback_error = %e,
                "approval not recorded and rollback failed"
            ),
        }
    }

    /// The most recent unapplied proposal previewed for this request.
    fn open_proposal(&self, request_id: Uuid) -> Result<Option<Uuid>, ApprovalError> {
        Ok(self
            .changesets
            .list(Some("proposed"))?
            .into_iter()
            .filter(|r| r.session_id == Some(request_id) && r.state == ChangeSetState::Proposed)
            .map(|r| r.change_set.id)
            .last())
    }

    fn decision_lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, ApprovalError> {
        self.decisions
            .lock()
            .map_err(|e| ApprovalError::from(ChangeSetError::LockPoisoned(e.to_string())))
    }
}

fn ensure_pending(request: &ShiftChangeRequest) -> Result<(), ApprovalError> {
    if request.status == RequestStatus::Pending {
        Ok(())
    } else {
        Err(ChangeSetError::AlreadyDecided {
            request_id: request.id,
            status: request.status.to_string(),
        }
        .into())
    }
}

/// Resolve an employee given by id or display name. Neither given is `None`.
fn resolve(
    roster: &Roster,
    id: Option<EmployeeId>,
    name: Option<&str>,
) -> Result<Option<EmployeeId>, ApprovalError> {
    if let Some(id) = id {
        if !roster.contains(id) {
            return Err(ChangeSetError::conflict(format!("employee {} is not on the roster", id)).into());
        }
        return Ok(Some(id));
    }
    let Some(name) = name else {
        return Ok(None);
    };
    match roster.match_name(name) {
        NameMatch::Found(id) => Ok(Some(id)),
        NameMatch::Missing => {
            Err(ChangeSetError::conflict(format!("no employee named '{}'", name)).into())
        }
        NameMatch::Ambiguous(names) => Err(ChangeSetError::conflict(format!(
            "'{}' matches several employees: {}",
            name,
            names.join(", ")
        ))
        .into()),
    }
}

/// Slots whose head count drops under a preview, each with the first
/// employee who left it. A slot someone leaves and someone else takes (a
/// swap, a reassignment) is still covered and needs no fill-in.
fn vacated_slots(preview: &Preview) -> Vec<(NaiveDate, TimeSlot, EmployeeId)> {
    let mut coverage: HashMap<(NaiveDate, TimeSlot), i64> = HashMap::new();
    let mut leavers: Vec<(NaiveDate, TimeSlot, EmployeeId)> = Vec::new();

    let left = preview
        .removed
        .iter()
        .chain(preview.updated.iter().map(|u| &u.before));
    for shift in left {
        let Some(slot) = shift.slot() else { continue };
        *coverage.entry((shift.date, slot)).or_default() -= 1;
        if !leavers.iter().any(|(d, s, _)| *d == shift.date && *s == slot) {
            leavers.push((shift.date, slot, shift.employee_id));
        }
    }
    let joined = preview
        .added
        .iter()
        .chain(preview.updated.iter().map(|u| &u.after));
    for shift in joined {
        if let Some(slot) = shift.slot() {
            *coverage.entry((shift.date, slot)).or_default() += 1;
        }
    }

    leavers
        .into_iter()
        .filter(|(date, slot, _)| coverage.get(&(*date, *slot)).is_some_and(|n| *n < 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rota_changeset::{AdjustmentRule, ChangeSetStore, Employee, ShiftStore};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn preview_of(rule: AdjustmentRule) -> Preview {
        let shifts = Arc::new(ShiftStore::new());
        shifts
            .load(vec![
                Shift::new(1, day("2024-06-04"), TimeSlot::Early),
                Shift::new(2, day("2024-06-04"), TimeSlot::Late),
                Shift::new(3, day("2024-06-04"), TimeSlot::Late),
            ])
            .unwrap();
        let roster = Roster::new((1..=4).map(|id| Employee::new(id, format!("emp-{}", id))).collect());
        ChangeSetStore::new(shifts, roster).propose(None, rule).unwrap()
    }

    #[test]
    fn absence_vacates_its_slot() {
        let preview = preview_of(AdjustmentRule::Absence {
            employee_id: 1,
            date: day("2024-06-04"),
        });
        assert_eq!(
            vacated_slots(&preview),
            vec![(day("2024-06-04"), TimeSlot::Early, 1)]
        );
    }

    #[test]
    fn moving_a_shift_vacates_only_the_slot_it_left() {
        let preview = preview_of(AdjustmentRule::ChangeTime {
            employee_id: 2,
            date: day("2024-06-04"),
            from_slot: TimeSlot::Late,
            to_slot: TimeSlot::Early,
        });
        assert_eq!(
            vacated_slots(&preview),
            vec![(day("2024-06-04"), TimeSlot::Late, 2)]
        );
    }

    #[test]
    fn swap_keeps_both_slots_covered() {
        let preview = preview_of(AdjustmentRule::Swap {
            employee_a: 1,
            employee_b: 2,
            date: day("2024-06-04"),
            slot: TimeSlot::Early,
            counterpart_slot: Some(TimeSlot::Late),
        });
        assert_eq!(preview.updated.len(), 2);
        assert!(vacated_slots(&preview).is_empty());
    }
}
