// session.rs — The per-client adjustment session state machine.
//
// A session sequences one edit at a time: acquire a rule, preview it, then
// apply, discard or roll back. It holds no schedule data; every operation
// goes through the Change-Set Store.
//
//   idle ──submit──▶ interpreting ──rule──▶ previewing ──apply──▶ applying ──▶ applied
//                        │ ambiguous            │ discard              │ stale      │ rollback
//                        ▼                      ▼                      ▼            ▼
//                       idle                   idle                   idle      rolled_back
//
// Any state may be abandoned back to idle. A fresh submit abandons whatever
// was in flight: the ticket counter moves on, so a parse result that arrives
// for an older ticket is dropped instead of applied.
//
// Push events are matched on change-set id, never on arrival alone, so a
// duplicated or reordered `schedule.updated` cannot cause a second transition.
// After a reconnect or a lagged subscription the session re-reads its tracked
// change-set record instead, since the events that would have moved it may
// be gone.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rota_changeset::{
    AdjustmentRule, ApplyReceipt, ChangeSetState, ChangeSetStore, ParseResponse, Preview,
    RollbackReceipt, ScheduleEvent, VoidReason,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// Where a session is in its edit cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    /// Waiting for the parser; only the result for `ticket` is accepted.
    Interpreting { ticket: u64 },
    /// A preview is on screen awaiting a decision.
    Previewing { change_set_id: Uuid },
    Applying { change_set_id: Uuid },
    Applied { change_set_id: Uuid, version: u64 },
    RolledBack { change_set_id: Uuid },
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Interpreting { .. } => write!(f, "interpreting"),
            SessionState::Previewing { .. } => write!(f, "previewing"),
            SessionState::Applying { .. } => write!(f, "applying"),
            SessionState::Applied { .. } => write!(f, "applied"),
            SessionState::RolledBack { .. } => write!(f, "rolled_back"),
        }
    }
}

impl SessionState {
    /// Valid transitions. Any state may return to idle (abandon).
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        if matches!(next, SessionState::Idle) {
            return true;
        }
        matches!(
            (self, next),
            (SessionState::Idle, SessionState::Interpreting { .. })
                | (SessionState::Interpreting { .. }, SessionState::Previewing { .. })
                | (SessionState::Previewing { .. }, SessionState::Applying { .. })
                | (SessionState::Applying { .. }, SessionState::Applied { .. })
                | (SessionState::Applied { .. }, SessionState::RolledBack { .. })
        )
    }
}

/// Handle for one submission. Only the newest ticket is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// How a submission ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// A preview is ready; the session is previewing it.
    Preview { preview: Box<Preview> },
    /// The parser needs the user to choose; the session is idle again.
    NeedsDisambiguation {
        choices: BTreeMap<String, Vec<String>>,
    },
    /// The session moved on before this result arrived; nothing changed.
    Superseded,
}

/// What a push event means for the consumer's view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReaction {
    /// The schedule changed; re-read it.
    pub refresh_schedule: bool,
    /// The preview this session is waiting on is ready.
    pub preview_ready: bool,
    /// The session changed state because of this event.
    pub transitioned: bool,
}

/// One client's adjustment session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentSession {
    pub session_id: Uuid,
    pub state: SessionState,
    /// Newest ticket handed out.
    generation: u64,
    /// The change-set the session is currently tracking (its latest preview).
    pub tracked_change_set: Option<Uuid>,
    /// The change-set the session last attempted to apply.
    pub last_apply_attempt: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for AdjustmentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AdjustmentSession {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            state: SessionState::Idle,
            generation: 0,
            tracked_change_set: None,
            last_apply_attempt: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "{} -> {}",
            self.state,
            next
        );
        tracing::debug!(
            session_id = %self.session_id,
            from = %self.state,
            to = %next,
            "session transition"
        );
        self.state = next;
        self.updated_at = Utc::now();
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            session_id: self.session_id,
            state: self.state.to_string(),
            operation,
        }
    }

    /// Return to idle, voiding an undecided preview and invalidating any
    /// in-flight submission.
    pub fn abandon(&mut self, store: &ChangeSetStore) {
        self.generation += 1;
        if let SessionState::Previewing { change_set_id } = self.state {
            if let Err(e) = store.void(change_set_id, VoidReason::Superseded) {
                tracing::debug!(change_set_id = %change_set_id, "abandoned preview already retired: {}", e);
            }
        }
        self.tracked_change_set = None;
        self.transition(SessionState::Idle);
    }

    /// Start a submission from any state. Whatever was in flight is abandoned.
    pub fn begin_submit(&mut self, store: &ChangeSetStore) -> Ticket {
        if self.state != SessionState::Idle {
            self.abandon(store);
        }
        self.generation += 1;
        self.transition(SessionState::Interpreting {
            ticket: self.generation,
        });
        Ticket(self.generation)
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        self.state == SessionState::Interpreting { ticket: ticket.0 }
    }

    /// Feed the parser's answer for `ticket`.
    ///
    /// A rule is previewed immediately. A disambiguation request or a failed
    /// parse returns the session to idle with the choices to show. A result
    /// for an abandoned ticket changes nothing.
    pub fn complete_submit(
        &mut self,
        ticket: Ticket,
        parsed: ParseResponse,
        store: &ChangeSetStore,
    ) -> Result<SubmitOutcome, SessionError> {
        if !self.is_current(ticket) {
            tracing::debug!(session_id = %self.session_id, "dropping result for abandoned submission");
            return Ok(SubmitOutcome::Superseded);
        }
        match parsed.ready_rule() {
            Some(rule) => self.preview(rule.clone(), store),
            None => {
                self.transition(SessionState::Idle);
                Ok(SubmitOutcome::NeedsDisambiguation {
                    choices: parsed.choices,
                })
            }
        }
    }

    /// The parser call for `ticket` failed outright.
    pub fn fail_submit(&mut self, ticket: Ticket) {
        if self.is_current(ticket) {
            self.transition(SessionState::Idle);
        }
    }

    /// Submit a structured rule, skipping the parser.
    pub fn submit_rule(
        &mut self,
        rule: AdjustmentRule,
        store: &ChangeSetStore,
    ) -> Result<SubmitOutcome, SessionError> {
        let _ticket = self.begin_submit(store);
        self.preview(rule, store)
    }

    fn preview(
        &mut self,
        rule: AdjustmentRule,
        store: &ChangeSetStore,
    ) -> Result<SubmitOutcome, SessionError> {
        match store.propose(Some(self.session_id), rule) {
            Ok(preview) => {
                let change_set_id = preview.change_set.id;
                self.tracked_change_set = Some(change_set_id);
                self.transition(SessionState::Previewing { change_set_id });
                Ok(SubmitOutcome::Preview {
                    preview: Box::new(preview),
                })
            }
            Err(e) => {
                self.transition(SessionState::Idle);
                Err(e.into())
            }
        }
    }

    /// Commit the previewed change-set.
    ///
    /// On `StaleChangeSet` the session drops back to idle and the caller
    /// must submit again to get a fresh preview.
    pub fn apply(&mut self, store: &ChangeSetStore) -> Result<ApplyReceipt, SessionError> {
        self.apply_as(store, None)
    }

    /// [`AdjustmentSession::apply`] on behalf of `actor`.
    pub fn apply_as(
        &mut self,
        store: &ChangeSetStore,
        actor: Option<&str>,
    ) -> Result<ApplyReceipt, SessionError> {
        let change_set_id = match self.state {
            SessionState::Previewing { change_set_id } => change_set_id,
            _ => return Err(self.invalid("apply")),
        };
        self.last_apply_attempt = Some(change_set_id);
        self.transition(SessionState::Applying { change_set_id });

        match store.apply_as(change_set_id, actor) {
            Ok(receipt) => {
                // A matching push event may already have moved us to applied.
                if self.state == (SessionState::Applying { change_set_id }) {
                    self.transition(SessionState::Applied {
                        change_set_id,
                        version: receipt.version_id,
                    });
                }
                Ok(receipt)
            }
            Err(e) => {
                if e.is_stale() {
                    tracing::info!(session_id = %self.session_id, "preview went stale, re-preview required");
                }
                self.tracked_change_set = None;
                self.transition(SessionState::Idle);
                Err(e.into())
            }
        }
    }

    /// Drop the previewed change-set.
    pub fn discard(&mut self, store: &ChangeSetStore) -> Result<(), SessionError> {
        let change_set_id = match self.state {
            SessionState::Previewing { change_set_id } => change_set_id,
            _ => return Err(self.invalid("discard")),
        };
        let result = store.discard(change_set_id);
        self.tracked_change_set = None;
        self.transition(SessionState::Idle);
        result.map_err(SessionError::from)
    }

    /// Undo the last edit.
    ///
    /// While previewing this is a discard. After an apply it restores the
    /// before-collection; a `StaleChangeSet` leaves the session applied.
    pub fn rollback(
        &mut self,
        store: &ChangeSetStore,
    ) -> Result<Option<RollbackReceipt>, SessionError> {
        self.rollback_as(store, None)
    }

    /// [`AdjustmentSession::rollback`] on behalf of `actor`.
    pub fn rollback_as(
        &mut self,
        store: &ChangeSetStore,
        actor: Option<&str>,
    ) -> Result<Option<RollbackReceipt>, SessionError> {
        match self.state {
            SessionState::Previewing { .. } => {
                self.discard(store)?;
                Ok(None)
            }
            SessionState::Applied { change_set_id, .. } => {
                let receipt = store.rollback_as(change_set_id, actor)?;
                self.transition(SessionState::RolledBack { change_set_id });
                Ok(Some(receipt))
            }
            _ => Err(self.invalid("roll back")),
        }
    }

    /// React to a push event.
    pub fn on_sync_event(&mut self, event: &ScheduleEvent) -> SyncReaction {
        match *event {
            ScheduleEvent::ProposalsReady { change_set_id } => SyncReaction {
                preview_ready: self.tracked_change_set == Some(change_set_id),
                ..SyncReaction::default()
            },
            ScheduleEvent::ScheduleUpdated {
                change_set_id,
                schedule_version,
            } => {
                let mut reaction = SyncReaction {
                    refresh_schedule: true,
                    ..SyncReaction::default()
                };
                if self.last_apply_attempt == Some(change_set_id)
                    && self.state == (SessionState::Applying { change_set_id })
                {
                    self.transition(SessionState::Applied {
                        change_set_id,
                        version: schedule_version,
                    });
                    reaction.transitioned = true;
                }
                reaction
            }
        }
    }

    /// The push channel reconnected or lagged; events may have been missed.
    ///
    /// The tracked change-set is looked up directly: an apply that landed
    /// completes the session, a rollback made elsewhere is followed, and a
    /// preview that was voided or purged drops the session to idle.
    pub fn on_reconnect(&mut self, store: &ChangeSetStore) -> SyncReaction {
        let mut reaction = SyncReaction {
            refresh_schedule: true,
            ..SyncReaction::default()
        };
        let change_set_id = match self.state {
            SessionState::Previewing { change_set_id }
            | SessionState::Applying { change_set_id }
            | SessionState::Applied { change_set_id, .. } => change_set_id,
            _ => return reaction,
        };
        let record = store.get(change_set_id).ok().map(|r| r.state);

        let next = match (&self.state, record) {
            (SessionState::Previewing { .. }, Some(ChangeSetState::Proposed)) => {
                reaction.preview_ready = self.tracked_change_set == Some(change_set_id);
                None
            }
            (SessionState::Previewing { .. }, _) => {
                self.tracked_change_set = None;
                Some(SessionState::Idle)
            }
            (
                SessionState::Applying { .. },
                Some(ChangeSetState::Applied { version, .. }),
            ) => Some(SessionState::Applied {
                change_set_id,
                version,
            }),
            (SessionState::Applied { .. }, Some(ChangeSetState::RolledBack { .. })) => {
                Some(SessionState::RolledBack { change_set_id })
            }
            _ => None,
        };
        if let Some(next) = next {
            tracing::info!(
                session_id = %self.session_id,
                change_set_id = %change_set_id,
                to = %next,
                "session caught up after missed events"
            );
            self.transition(next);
            reaction.transitioned = true;
        }
        reaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rota_changeset::{Employee, Roster, Shift, ShiftStore, TimeSlot};
    use std::sync::Arc;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn store() -> ChangeSetStore {
        let shifts = Arc::new(ShiftStore::new());
        shifts
            .load(vec![
                Shift::new(7, day("2024-06-03"), TimeSlot::Early),
                Shift::new(2, day("2024-06-03"), TimeSlot::Late),
            ])
            .unwrap();
        ChangeSetStore::new(
            shifts,
            Roster::new(vec![Employee::new(7, "Sato"), Employee::new(2, "Kato")]),
        )
    }

    fn absence() -> AdjustmentRule {
        AdjustmentRule::Absence {
            employee_id: 7,
            date: day("2024-06-03"),
        }
    }

    fn parsed(rule: AdjustmentRule) -> ParseResponse {
        ParseResponse {
            ok: true,
            rule: Some(rule),
            ..ParseResponse::default()
        }
    }

    fn previewing(session: &AdjustmentSession) -> Uuid {
        match session.state {
            SessionState::Previewing { change_set_id } => change_set_id,
            ref other => panic!("expected previewing, got {}", other),
        }
    }

    #[test]
    fn submit_preview_apply_rollback() {
        let store = store();
        let mut session = AdjustmentSession::new();

        let ticket = session.begin_submit(&store);
        assert_eq!(session.state.to_string(), "interpreting");
        session.complete_submit(ticket, parsed(absence()), &store).unwrap();
        let id = previewing(&session);
        assert_eq!(session.tracked_change_set, Some(id));

        let receipt = session.apply(&store).unwrap();
        assert_eq!(
            session.state,
            SessionState::Applied {
                change_set_id: id,
                version: receipt.version_id
            }
        );

        session.rollback(&store).unwrap().unwrap();
        assert_eq!(session.state, SessionState::RolledBack { change_set_id: id });
    }

    #[test]
    fn ambiguity_returns_to_idle_without_error() {
        let store = store();
        let mut session = AdjustmentSession::new();
        let ticket = session.begin_submit(&store);
        let mut choices = BTreeMap::new();
        choices.insert("employee".to_string(), vec!["Sato".into(), "Saito".into()]);
        let outcome = session
            .complete_submit(
                ticket,
                ParseResponse {
                    ok: true,
                    rule: None,
                    needs_disambiguation: true,
                    choices,
                },
                &store,
            )
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::NeedsDisambiguation { ref choices } if choices.len() == 1));
        assert_eq!(session.state, SessionState::Idle);
    }

    #[test]
    fn late_parse_result_for_abandoned_ticket_is_dropped() {
        let store = store();
        let mut session = AdjustmentSession::new();
        let old = session.begin_submit(&store);
        let new = session.begin_submit(&store);

        let outcome = session.complete_submit(old, parsed(absence()), &store).unwrap();
        assert!(matches!(outcome, SubmitOutcome::Superseded));
        assert_eq!(session.state, SessionState::Interpreting { ticket: new.0 });
        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn resubmitting_voids_the_previous_preview() {
        let store = store();
        let mut session = AdjustmentSession::new();
        session.submit_rule(absence(), &store).unwrap();
        let first = previewing(&session);
        session.submit_rule(absence(), &store).unwrap();
        let second = previewing(&session);

        assert_ne!(first, second);
        assert!(matches!(
            store.get(first).unwrap().state,
            ChangeSetState::Void { .. }
        ));
        assert_eq!(store.list(Some("proposed")).unwrap().len(), 1);
    }

    #[test]
    fn stale_apply_returns_to_idle() {
        let store = store();
        let mut mine = AdjustmentSession::new();
        let mut theirs = AdjustmentSession::new();
        mine.submit_rule(absence(), &store).unwrap();
        theirs
            .submit_rule(
                AdjustmentRule::AddShift {
                    employee_id: 2,
                    date: day("2024-06-04"),
                    slot: TimeSlot::Night,
                },
                &store,
            )
            .unwrap();

        theirs.apply(&store).unwrap();
        let err = mine.apply(&store).unwrap_err();
        assert_eq!(err.kind(), "stale_change_set");
        assert_eq!(mine.state, SessionState::Idle);
        assert!(mine.tracked_change_set.is_none());
    }

    #[test]
    fn rule_conflict_returns_to_idle() {
        let store = store();
        let mut session = AdjustmentSession::new();
        let err = session
            .submit_rule(
                AdjustmentRule::CancelRequest {
                    employee_id: 2,
                    date: day("2024-06-05"),
                    slot: TimeSlot::Early,
                },
                &store,
            )
            .unwrap_err();
        assert_eq!(err.kind(), "rule_conflict");
        assert_eq!(session.state, SessionState::Idle);
    }

    #[test]
    fn discard_and_rollback_while_previewing_go_idle() {
        let store = store();
        let mut session = AdjustmentSession::new();
        session.submit_rule(absence(), &store).unwrap();
        session.discard(&store).unwrap();
        assert_eq!(session.state, SessionState::Idle);

        session.submit_rule(absence(), &store).unwrap();
        assert!(session.rollback(&store).unwrap().is_none());
        assert_eq!(session.state, SessionState::Idle);
    }

    #[test]
    fn apply_while_idle_is_invalid() {
        let store = store();
        let mut session = AdjustmentSession::new();
        assert_eq!(session.apply(&store).unwrap_err().kind(), "invalid_state");
        assert_eq!(session.rollback(&store).unwrap_err().kind(), "invalid_state");
    }

    #[test]
    fn update_for_other_change_set_only_refreshes() {
        let store = store();
        let mut session = AdjustmentSession::new();
        session.submit_rule(absence(), &store).unwrap();
        let before = session.state.clone();

        let reaction = session.on_sync_event(&ScheduleEvent::ScheduleUpdated {
            change_set_id: Uuid::new_v4(),
            schedule_version: 9,
        });
        assert!(reaction.refresh_schedule);
        assert!(!reaction.transitioned);
        assert_eq!(session.state, before);
    }

    #[test]
    fn matching_update_while_applying_transitions_once() {
        let mut session = AdjustmentSession::new();
        let id = Uuid::new_v4();
        session.state = SessionState::Applying { change_set_id: id };
        session.last_apply_attempt = Some(id);
        let event = ScheduleEvent::ScheduleUpdated {
            change_set_id: id,
            schedule_version: 4,
        };

        assert!(session.on_sync_event(&event).transitioned);
        assert_eq!(
            session.state,
            SessionState::Applied {
                change_set_id: id,
                version: 4
            }
        );
        // Duplicate delivery.
        let again = session.on_sync_event(&event);
        assert!(!again.transitioned);
        assert!(again.refresh_schedule);
    }

    #[test]
    fn proposals_ready_is_gated_on_tracked_id() {
        let store = store();
        let mut session = AdjustmentSession::new();
        session.submit_rule(absence(), &store).unwrap();
        let id = previewing(&session);

        assert!(session
            .on_sync_event(&ScheduleEvent::ProposalsReady { change_set_id: id })
            .preview_ready);
        assert!(!session
            .on_sync_event(&ScheduleEvent::ProposalsReady {
                change_set_id: Uuid::new_v4()
            })
            .preview_ready);
    }

    #[test]
    fn reconnect_completes_an_apply_whose_event_was_missed() {
        let store = store();
        let mut session = AdjustmentSession::new();
        session.submit_rule(absence(), &store).unwrap();
        let id = previewing(&session);
        // The commit landed but neither the response nor the event arrived.
        let receipt = store.apply(id).unwrap();
        session.state = SessionState::Applying { change_set_id: id };

        let reaction = session.on_reconnect(&store);
        assert!(reaction.refresh_schedule);
        assert!(reaction.transitioned);
        assert_eq!(
            session.state,
            SessionState::Applied {
                change_set_id: id,
                version: receipt.version_id
            }
        );
        assert!(!session.on_reconnect(&store).transitioned);
    }

    #[test]
    fn reconnect_drops_a_preview_voided_elsewhere() {
        let store = store();
        let mut session = AdjustmentSession::new();
        session.submit_rule(absence(), &store).unwrap();
        let id = previewing(&session);
        store.discard(id).unwrap();

        let reaction = session.on_reconnect(&store);
        assert!(reaction.transitioned);
        assert_eq!(session.state, SessionState::Idle);
        assert!(session.tracked_change_set.is_none());
    }

    #[test]
    fn reconnect_keeps_a_live_preview() {
        let store = store();
        let mut session = AdjustmentSession::new();
        session.submit_rule(absence(), &store).unwrap();
        let id = previewing(&session);

        let reaction = session.on_reconnect(&store);
        assert!(reaction.preview_ready);
        assert!(!reaction.transitioned);
        assert_eq!(session.state, SessionState::Previewing { change_set_id: id });
    }

    #[test]
    fn reconnect_follows_a_rollback_made_elsewhere() {
        let store = store();
        let mut session = AdjustmentSession::new();
        session.submit_rule(absence(), &store).unwrap();
        session.apply_as(&store, Some("manager")).unwrap();
        let id = session.tracked_change_set.unwrap();
        store.rollback_as(id, Some("owner")).unwrap();

        assert!(session.on_reconnect(&store).transitioned);
        assert_eq!(session.state, SessionState::RolledBack { change_set_id: id });
        assert!(session.on_reconnect(&store).refresh_schedule);
    }

    #[test]
    fn transition_table() {
        let id = Uuid::nil();
        assert!(SessionState::Idle.can_transition_to(&SessionState::Interpreting { ticket: 1 }));
        assert!(!SessionState::Idle.can_transition_to(&SessionState::Applying { change_set_id: id }));
        assert!(SessionState::Applying { change_set_id: id }.can_transition_to(&SessionState::Idle));
        assert!(!SessionState::Previewing { change_set_id: id }
            .can_transition_to(&SessionState::RolledBack { change_set_id: id }));
    }
}
