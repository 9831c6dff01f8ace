//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rota_approval::{ApprovalWorkflow, LoadBalancingRanker, RequestStore};
use chrono::{DateTime, Utc};
use rota_changeset::{
    AuditLog, ChangeSetStore, EventDispatcher, LogSink, Optimizer, Roster, RuleParser,
    ShiftStore, SuggestionRanker,
};
use rota_events::{SyncError, SyncHub};
use rota_session::SessionRegistry;

use crate::clients::{HttpOptimizer, HttpRanker, HttpRuleParser, JsonEndpoint};
use crate::config::{DaemonConfig, EndpointConfig, RankerMode};
use crate::ws::Connections;

/// Cloned into every handler; everything inside is shared.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DaemonConfig>,
    pub changesets: Arc<ChangeSetStore>,
    pub hub: SyncHub,
    pub sessions: Arc<SessionRegistry>,
    pub approvals: Arc<ApprovalWorkflow>,
    pub connections: Arc<Connections>,
    pub optimizer: Option<Arc<dyn Optimizer>>,
    pub parser: Option<Arc<dyn RuleParser>>,
}

impl AppState {
    /// Wire up stores and collaborators from configuration.
    pub fn from_config(config: DaemonConfig) -> anyhow::Result<Self> {
        let ranker: Arc<dyn SuggestionRanker> = match config.ranker.mode {
            RankerMode::Builtin => Arc::new(LoadBalancingRanker::new()),
            RankerMode::Http => {
                let url = config
                    .ranker
                    .url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("[ranker] mode = \"http\" needs a url"))?;
                Arc::new(HttpRanker(JsonEndpoint::new(url, Duration::from_secs(30))?))
            }
        };
        let optimizer = endpoint(&config.optimizer)?
            .map(|e| Arc::new(HttpOptimizer(e)) as Arc<dyn Optimizer>);
        let parser = endpoint(&config.parser)?
            .map(|e| Arc::new(HttpRuleParser(e)) as Arc<dyn RuleParser>);
        let requests = RequestStore::new(config.requests_dir())?;

        let mut state = Self::with_parts(config, requests, ranker, true)?;
        state.optimizer = optimizer;
        state.parser = parser;
        Ok(state)
    }

    /// Assemble state from explicit parts. `audit_log` adds the JSONL event
    /// log and the apply/rollback audit trail under the configured data
    /// directory.
    pub fn with_parts(
        config: DaemonConfig,
        requests: RequestStore,
        ranker: Arc<dyn SuggestionRanker>,
        audit_log: bool,
    ) -> anyhow::Result<Self> {
        let hub = SyncHub::new(config.sync.capacity);
        let mut dispatcher = EventDispatcher::new();
        dispatcher.add_sink(Arc::new(hub.clone()));
        if audit_log {
            dispatcher.add_sink(Arc::new(LogSink::new(config.event_log())));
        }

        let mut changesets = ChangeSetStore::new(Arc::new(ShiftStore::new()), Roster::default())
            .with_dispatcher(dispatcher);
        if audit_log {
            std::fs::create_dir_all(&config.data_dir)?;
            changesets = changesets.with_audit(AuditLog::open(config.audit_log())?);
        }
        let changesets = Arc::new(changesets);
        let approvals = ApprovalWorkflow::new(requests, changesets.clone(), ranker)
            .with_display_candidates(config.approval.display_candidates);

        let connections = Connections::with_queue(config.sync.outbound_queue);

        Ok(Self {
            config: Arc::new(config),
            changesets,
            hub,
            sessions: Arc::new(SessionRegistry::new()),
            approvals: Arc::new(approvals),
            connections: Arc::new(connections),
            optimizer: None,
            parser: None,
        })
    }
}

fn endpoint(config: &EndpointConfig) -> anyhow::Result<Option<JsonEndpoint>> {
    match &config.url {
        Some(url) => Ok(Some(JsonEndpoint::new(
            url.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(None),
    }
}

/// Feed hub events to the hosted sessions so they reconcile by change-set id.
/// If the pump lags, the missed events are gone and every session re-reads
/// its tracked change-set instead.
pub fn start_session_pump(state: &AppState) -> tokio::task::JoinHandle<()> {
    let mut events = Box::pin(state.hub.stream());
    let sessions = state.sessions.clone();
    let changesets = state.changesets.clone();
    tokio::spawn(async move {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    let moved = sessions.deliver(&event).await;
                    if moved > 0 {
                        tracing::debug!(event = event.event_type(), moved, "sessions reconciled");
                    }
                }
                Err(SyncError::Lagged(missed)) => {
                    let moved = sessions.resync(&changesets).await;
                    tracing::warn!(missed, moved, "session pump lagged behind the hub, sessions resynced");
                }
                Err(e) => tracing::warn!(error = %e, "session pump error"),
            }
        }
    })
}

/// Periodically drop retired change sets older than the configured window.
pub fn start_retention_sweep(state: &AppState) -> tokio::task::JoinHandle<()> {
    let changesets = state.changesets.clone();
    let retired_hours = state.config.retention.retired_hours;
    let every = Duration::from_secs(state.config.retention.sweep_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = changesets.purge_retired(retention_cutoff(Utc::now(), retired_hours)) {
                tracing::warn!(error = %e, "retention sweep failed");
            }
        }
    })
}

/// Records retired before this instant are purged. A window too large to
/// represent keeps everything.
fn retention_cutoff(now: DateTime<Utc>, retired_hours: u64) -> DateTime<Utc> {
    i64::try_from(retired_hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .and_then(|keep| now.checked_sub_signed(keep))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rota_changeset::{AdjustmentRule, Employee, ScheduleEvent, Shift, TimeSlot};
    use rota_session::SessionState;
    use uuid::Uuid;

    #[tokio::test]
    async fn lagged_pump_resyncs_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DaemonConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.sync.capacity = 1;
        let state = AppState::with_parts(
            config,
            RequestStore::new(dir.path().join("requests")).unwrap(),
            Arc::new(LoadBalancingRanker::new()),
            false,
        )
        .unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        state
            .changesets
            .shift_store()
            .load(vec![Shift::new(7, date, TimeSlot::Early)])
            .unwrap();
        state
            .changesets
            .set_roster(Roster::new(vec![Employee::new(7, "Sato")]))
            .unwrap();

        let session = state.sessions.create().await;
        let id = {
            let mut s = session.lock().await;
            s.submit_rule(
                AdjustmentRule::Absence {
                    employee_id: 7,
                    date,
                },
                &state.changesets,
            )
            .unwrap();
            let id = s.tracked_change_set.unwrap();
            s.state = SessionState::Applying { change_set_id: id };
            s.last_apply_attempt = Some(id);
            id
        };

        let pump = start_session_pump(&state);
        // The commit's event is pushed out of the one-slot buffer before
        // the pump gets to run.
        state.changesets.apply(id).unwrap();
        for version in 10..12 {
            state.hub.publish(ScheduleEvent::ScheduleUpdated {
                change_set_id: Uuid::new_v4(),
                schedule_version: version,
            });
        }

        let mut applied = false;
        for _ in 0..100 {
            if session.lock().await.state.to_string() == "applied" {
                applied = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pump.abort();
        assert!(applied, "session never caught up after the lag");
    }

    #[test]
    fn retention_cutoff_handles_huge_windows() {
        let now = Utc::now();
        assert_eq!(retention_cutoff(now, 2), now - chrono::Duration::hours(2));
        assert_eq!(retention_cutoff(now, 0), now);
        assert_eq!(retention_cutoff(now, u64::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(retention_cutoff(now, i64::MAX as u64), DateTime::<Utc>::MIN_UTC);
    }
}
