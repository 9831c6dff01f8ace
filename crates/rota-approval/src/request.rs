// request.rs — Employee-submitted shift change requests.
//
// A request arrives from an intake channel (chat bot, web form) as a typed
// intent. It is mutated only by the approval workflow and never deleted:
// approved and rejected are terminal and kept for audit.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rota_changeset::{AdjustmentRule, ChangeSetError, EmployeeId, TimeSlot};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApprovalError;

/// What the employee is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Absence,
    ChangeTime,
    Swap,
    AddShift,
    CancelRequest,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Absence => "absence",
            RequestKind::ChangeTime => "change_time",
            RequestKind::Swap => "swap",
            RequestKind::AddShift => "add_shift",
            RequestKind::CancelRequest => "cancel_request",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Approved => write!(f, "approved"),
            RequestStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = ApprovalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(ApprovalError::Invalid(format!("unknown status '{}'", other))),
        }
    }
}

/// Intake payload. The requester and swap target may be given by id or by
/// display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRequest {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    #[serde(default)]
    pub employee_id: Option<EmployeeId>,
    #[serde(default)]
    pub employee_name: Option<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub from_slot: Option<TimeSlot>,
    #[serde(default)]
    pub to_slot: Option<TimeSlot>,
    #[serde(default)]
    pub target_employee_id: Option<EmployeeId>,
    #[serde(default)]
    pub target_employee_name: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Intake channel, e.g. `line` or `web`.
    #[serde(default)]
    pub requested_via: Option<String>,
    /// Requester's id on the intake channel.
    #[serde(default)]
    pub external_user_id: Option<String>,
}

/// A stored request with its review state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftChangeRequest {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub employee_id: EmployeeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_slot: Option<TimeSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_slot: Option<TimeSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_employee_id: Option<EmployeeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_employee_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_via: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_user_id: Option<String>,

    /// Week containing `date`, captured at intake.
    pub snapshot_week_start: NaiveDate,
    pub snapshot_week_end: NaiveDate,
    /// Schedule version at intake.
    pub snapshot_version: u64,

    /// The change-set committed on approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_set_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_note: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShiftChangeRequest {
    /// Derive the adjustment rule this request stands for.
    ///
    /// - `absence`: every shift of the requester on `date`
    /// - `change_time`: requester's `from_slot` → `to_slot`
    /// - `swap`: requester on `from_slot` ↔ target on `to_slot` (defaults to `from_slot`)
    /// - `add_shift`: requester on `to_slot` (or `from_slot`)
    /// - `cancel_request`: requester's `from_slot` assignment
    pub fn to_rule(&self) -> Result<AdjustmentRule, ApprovalError> {
        let employee_id = self.employee_id;
        let date = self.date;
        let missing = |field: &str| {
            ApprovalError::Invalid(format!("{} request needs {}", self.kind, field))
        };
        let rule = match self.kind {
            RequestKind::Absence => AdjustmentRule::Absence { employee_id, date },
            RequestKind::ChangeTime => AdjustmentRule::ChangeTime {
                employee_id,
                date,
                from_slot: self.from_slot.ok_or_else(|| missing("from_slot"))?,
                to_slot: self.to_slot.ok_or_else(|| missing("to_slot"))?,
            },
            RequestKind::Swap => AdjustmentRule::Swap {
                employee_a: employee_id,
                employee_b: self
                    .target_employee_id
                    .ok_or_else(|| missing("target_employee"))?,
                date,
                slot: self.from_slot.ok_or_else(|| missing("from_slot"))?,
                counterpart_slot: self.to_slot,
            },
            RequestKind::AddShift => AdjustmentRule::AddShift {
                employee_id,
                date,
                slot: self
                    .to_slot
                    .or(self.from_slot)
                    .ok_or_else(|| missing("to_slot"))?,
            },
            RequestKind::CancelRequest => AdjustmentRule::CancelRequest {
                employee_id,
                date,
                slot: self.from_slot.ok_or_else(|| missing("from_slot"))?,
            },
        };
        Ok(rule)
    }

    /// Move out of pending. Both terminal states are final.
    pub fn decide(
        &mut self,
        status: RequestStatus,
        decided_by: Option<String>,
        note: Option<String>,
    ) -> Result<(), ApprovalError> {
        if self.status != RequestStatus::Pending || status == RequestStatus::Pending {
            return Err(ChangeSetError::AlreadyDecided {
                request_id: self.id,
                status: self.status.to_string(),
            }
            .into());
        }
        self.status = status;
        self.decided_by = decided_by;
        self.decision_note = note;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn request(kind: RequestKind) -> ShiftChangeRequest {
        ShiftChangeRequest {
            id: Uuid::new_v4(),
            kind,
            employee_id: 3,
            employee_name: None,
            date: day("2024-06-04"),
            from_slot: None,
            to_slot: None,
            target_employee_id: None,
            target_employee_name: None,
            reason: None,
            status: RequestStatus::Pending,
            requested_via: Some("line".into()),
            external_user_id: None,
            snapshot_week_start: day("2024-06-03"),
            snapshot_week_end: day("2024-06-09"),
            snapshot_version: 1,
            change_set_id: None,
            decided_by: None,
            decision_note: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn swap_maps_slots_to_both_sides() {
        let mut req = request(RequestKind::Swap);
        req.from_slot = Some(TimeSlot::Late);
        req.to_slot = Some(TimeSlot::Early);
        req.target_employee_id = Some(9);
        assert_eq!(
            req.to_rule().unwrap(),
            AdjustmentRule::Swap {
                employee_a: 3,
                employee_b: 9,
                date: day("2024-06-04"),
                slot: TimeSlot::Late,
                counterpart_slot: Some(TimeSlot::Early),
            }
        );
    }

    #[test]
    fn missing_slot_is_invalid() {
        let req = request(RequestKind::ChangeTime);
        let err = req.to_rule().unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
        assert!(err.to_string().contains("from_slot"));
    }

    #[test]
    fn decisions_are_terminal() {
        let mut req = request(RequestKind::Absence);
        req.decide(RequestStatus::Rejected, None, Some("short staffed".into()))
            .unwrap();
        let err = req
            .decide(RequestStatus::Approved, Some("manager".into()), None)
            .unwrap_err();
        assert_eq!(err.kind(), "already_decided");
        assert_eq!(req.status, RequestStatus::Rejected);
    }

    #[test]
    fn wire_form_uses_type_and_slot_names() {
        let mut req = request(RequestKind::AddShift);
        req.to_slot = Some(TimeSlot::Night);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "add_shift");
        assert_eq!(json["to_slot"], "00-08");
        assert_eq!(json["status"], "pending");
        assert!(json.get("from_slot").is_none());
    }

    #[test]
    fn status_parses_from_query_string() {
        assert_eq!("approved".parse::<RequestStatus>().unwrap(), RequestStatus::Approved);
        assert!("done".parse::<RequestStatus>().is_err());
    }
}
