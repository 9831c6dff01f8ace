// events.rs — Engine events and notification dispatch.
//
// The Change-Set Store emits an event when a preview is ready and when the
// schedule moves to a new version. Sinks (the JSONL audit log, the Sync
// Channel hub) subscribe through `NotificationSink`.
//
// The wire form is the push-channel message itself:
//   { "type": "proposals_ready", "change_set_id": ... }
//   { "type": "schedule.updated", "change_set_id": ..., "schedule_version": ... }

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChangeSetError;

/// Events announced to every connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScheduleEvent {
    /// A requested preview finished computing.
    #[serde(rename = "proposals_ready")]
    ProposalsReady { change_set_id: Uuid },

    /// An apply or rollback committed; the schedule is now at `schedule_version`.
    #[serde(rename = "schedule.updated")]
    ScheduleUpdated {
        change_set_id: Uuid,
        #[serde(default)]
        schedule_version: u64,
    },
}

impl ScheduleEvent {
    /// The `type` tag as it appears on the wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            ScheduleEvent::ProposalsReady { .. } => "proposals_ready",
            ScheduleEvent::ScheduleUpdated { .. } => "schedule.updated",
        }
    }

    pub fn change_set_id(&self) -> Uuid {
        match self {
            ScheduleEvent::ProposalsReady { change_set_id }
            | ScheduleEvent::ScheduleUpdated { change_set_id, .. } => *change_set_id,
        }
    }
}

/// Receives engine events.
///
/// Errors are logged by the dispatcher and never reach the operation that
/// produced the event.
pub trait NotificationSink: Send + Sync {
    fn send(&self, event: &ScheduleEvent) -> Result<(), ChangeSetError>;
}

/// Appends events as JSONL to a file (always-on audit sink).
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl NotificationSink for LogSink {
    fn send(&self, event: &ScheduleEvent) -> Result<(), ChangeSetError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ChangeSetError::IoError {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| ChangeSetError::IoError {
                path: self.path.display().to_string(),
                source,
            })?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json).map_err(|source| ChangeSetError::IoError {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }
}

/// Fans events out to every registered sink.
///
/// A failing sink is logged and skipped; the remaining sinks still receive
/// the event.
#[derive(Default, Clone)]
pub struct EventDispatcher {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn dispatch(&self, event: &ScheduleEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!(event_type = event.event_type(), "notification sink error: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
