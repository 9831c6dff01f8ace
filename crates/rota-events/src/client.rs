//! Supervised, reconnecting subscription to the sync channel.
//!
//! [`SyncClient::spawn`] starts a task that owns the connection: connect,
//! forward events, and on closure wait out a backoff and connect again. The
//! consumer only sees [`ClientEvent`]s on a channel. The channel carries no
//! replay; after every `Connected` the consumer re-fetches the schedule.

use std::sync::Arc;

use futures::StreamExt;
use rota_changeset::ScheduleEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backoff::{Backoff, BackoffConfig};
use crate::connector::Connector;

/// What the supervisor reports to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A connection is up. `attempt` counts connects since spawn, starting at 1.
    /// Anything above 1 means events may have been missed.
    Connected { attempt: u32 },
    Event(ScheduleEvent),
    Disconnected { reason: String },
}

impl ClientEvent {
    /// The consumer should re-read the schedule rather than trust local state.
    pub fn requires_resync(&self) -> bool {
        matches!(self, ClientEvent::Connected { attempt } if *attempt > 1)
    }
}

/// Handle to a running supervisor task.
pub struct SyncClient {
    events: mpsc::Receiver<ClientEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncClient {
    /// Start the supervisor on the current runtime.
    pub fn spawn(connector: Arc<dyn Connector>, backoff: BackoffConfig) -> Self {
        let (tx, events) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(connector, Backoff::new(backoff), tx, cancel.clone()));
        Self {
            events,
            cancel,
            task,
        }
    }

    /// Next event; `None` once the client has shut down.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Stop the supervisor and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.task).await {
            tracing::warn!("sync client task ended abnormally: {}", e);
        }
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn supervise(
    connector: Arc<dyn Connector>,
    mut backoff: Backoff,
    tx: mpsc::Sender<ClientEvent>,
    cancel: CancellationToken,
) {
    let endpoint = connector.describe();
    let mut attempt = 0u32;

    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = connector.connect() => result,
        };

        match connected {
            Ok(mut stream) => {
                attempt += 1;
                backoff.reset();
                if tx.send(ClientEvent::Connected { attempt }).await.is_err() {
                    return;
                }

                let reason = loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => return,
                        next = stream.next() => next,
                    };
                    match next {
                        Some(Ok(event)) => {
                            if tx.send(ClientEvent::Event(event)).await.is_err() {
                                return;
                            }
                        }
                        Some(Err(e)) => break e.to_string(),
                        None => break "stream closed".to_string(),
                    }
                };

                tracing::warn!(endpoint = %endpoint, reason = %reason, "sync channel disconnected");
                if tx.send(ClientEvent::Disconnected { reason }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "sync channel connect failed");
            }
        }

        let delay = backoff.next_delay();
        tracing::debug!(endpoint = %endpoint, delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
