// external.rs — Contracts for the external collaborators.
//
// The optimizer, the rule parser and the suggestion ranker are network
// services owned elsewhere. The engine only sees these traits; the daemon
// supplies HTTP implementations and tests supply small fakes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ChangeSetError;
use crate::roster::Roster;
use crate::rule::AdjustmentRule;
use crate::shift::{EmployeeId, Shift, TimeSlot};

/// Request for a full-week baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeRequest {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub employee_ids: Vec<EmployeeId>,
    /// Opaque to the engine; forwarded as-is.
    #[serde(default)]
    pub constraints: serde_json::Value,
}

/// Feasibility reported by the optimizer. `OPTIMAL` counts as feasible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizationStatus {
    #[serde(alias = "OPTIMAL")]
    Feasible,
    Infeasible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeResponse {
    #[serde(default)]
    pub shifts: Vec<Shift>,
    pub optimization_status: OptimizationStatus,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRequest {
    pub free_text: String,
}

/// Parser output: either a rule or a disambiguation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseResponse {
    pub ok: bool,
    #[serde(default)]
    pub rule: Option<AdjustmentRule>,
    #[serde(default)]
    pub needs_disambiguation: bool,
    /// Field name → the options the user must pick from.
    #[serde(default)]
    pub choices: BTreeMap<String, Vec<String>>,
}

impl ParseResponse {
    /// The rule, if the parser produced a usable one.
    pub fn ready_rule(&self) -> Option<&AdjustmentRule> {
        if self.ok && !self.needs_disambiguation {
            self.rule.as_ref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankRequest {
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub roster: Roster,
}

/// A ranked fill-in suggestion. Rank 1 is best.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub employee_id: EmployeeId,
    pub name: String,
    pub rank: u32,
}

/// Produces an initial full-week assignment.
#[async_trait]
pub trait Optimizer: Send + Sync {
    async fn optimize(&self, request: &OptimizeRequest) -> Result<OptimizeResponse, ChangeSetError>;
}

/// Turns free text into a normalized rule.
#[async_trait]
pub trait RuleParser: Send + Sync {
    async fn parse(&self, request: &ParseRequest) -> Result<ParseResponse, ChangeSetError>;
}

/// Scores employees for an uncovered slot.
///
/// `current` is the schedule the slot belongs to, for rankers that need it;
/// remote rankers may ignore it. Output is ordered best-first.
#[async_trait]
pub trait SuggestionRanker: Send + Sync {
    async fn rank(
        &self,
        request: &RankRequest,
        current: &[Shift],
    ) -> Result<Vec<Candidate>, ChangeSetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimal_is_feasible() {
        let status: OptimizationStatus = serde_json::from_str("\"OPTIMAL\"").unwrap();
        assert_eq!(status, OptimizationStatus::Feasible);
        let status: OptimizationStatus = serde_json::from_str("\"INFEASIBLE\"").unwrap();
        assert_eq!(status, OptimizationStatus::Infeasible);
    }

    #[test]
    fn disambiguation_has_no_ready_rule() {
        let raw = r#"{
            "ok": true,
            "rule": {"action": "absence", "employee_id": 7, "date": "2024-06-03"},
            "needs_disambiguation": true,
            "choices": {"employee": ["Sato Hana", "Sato Ken"]}
        }"#;
        let resp: ParseResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.ready_rule().is_none());
        assert_eq!(resp.choices["employee"].len(), 2);
    }

    #[test]
    fn parsed_rule_is_ready() {
        let raw = r#"{"ok": true, "rule": {"action": "add_shift", "employee_id": 2, "date": "2024-06-05", "slot": "night"}}"#;
        let resp: ParseResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.ready_rule().map(|r| r.action()), Some("add_shift"));
    }
}
