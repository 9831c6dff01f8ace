// driver.rs — Async helpers that run sessions against network collaborators.
//
// The session lock is never held across a parser round trip: the ticket is
// taken under the lock, the lock is released for the call, and the result is
// fed back under a fresh lock. A submit that lands in between invalidates the
// ticket and the late result is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use rota_changeset::{ChangeSetStore, ParseRequest, RuleParser, ScheduleEvent};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::SessionError;
use crate::session::{AdjustmentSession, SubmitOutcome, SyncReaction};

pub type SharedSession = Arc<Mutex<AdjustmentSession>>;

/// Interpret free text and preview the resulting rule.
pub async fn submit_text(
    session: &Mutex<AdjustmentSession>,
    parser: &dyn RuleParser,
    store: &ChangeSetStore,
    free_text: &str,
) -> Result<SubmitOutcome, SessionError> {
    let ticket = session.lock().await.begin_submit(store);

    let parsed = parser
        .parse(&ParseRequest {
            free_text: free_text.to_string(),
        })
        .await;

    let mut session = session.lock().await;
    match parsed {
        Ok(response) => session.complete_submit(ticket, response, store),
        Err(e) => {
            session.fail_submit(ticket);
            Err(e.into())
        }
    }
}

/// Live sessions keyed by id, shared by request handlers and the event pump.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> SharedSession {
        let session = AdjustmentSession::new();
        let id = session.session_id;
        let shared = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, shared.clone());
        tracing::info!(session_id = %id, "session opened");
        shared
    }

    pub async fn get(&self, session_id: Uuid) -> Result<SharedSession, SessionError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(SessionError::NotFound(session_id))
    }

    /// Close a session, voiding any preview it left behind.
    pub async fn close(&self, session_id: Uuid, store: &ChangeSetStore) -> Result<(), SessionError> {
        let shared = self
            .sessions
            .write()
            .await
            .remove(&session_id)
            .ok_or(SessionError::NotFound(session_id))?;
        shared.lock().await.abandon(store);
        tracing::info!(session_id = %session_id, "session closed");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Deliver a push event to every session. Returns how many changed state.
    pub async fn deliver(&self, event: &ScheduleEvent) -> usize {
        let sessions: Vec<SharedSession> = self.sessions.read().await.values().cloned().collect();
        let mut transitioned = 0;
        for session in sessions {
            let reaction: SyncReaction = session.lock().await.on_sync_event(event);
            if reaction.transitioned {
                transitioned += 1;
            }
        }
        transitioned
    }

    /// Push events were lost; let every session re-read its tracked
    /// change-set. Returns how many changed state.
    pub async fn resync(&self, store: &ChangeSetStore) -> usize {
        let sessions: Vec<SharedSession> = self.sessions.read().await.values().cloned().collect();
        let mut transitioned = 0;
        for session in sessions {
            if session.lock().await.on_reconnect(store).transitioned {
                transitioned += 1;
            }
        }
        if transitioned > 0 {
            tracing::info!(transitioned, "sessions resynchronized");
        }
        transitioned
    }
}
