//! The `/ws/adjustments` push endpoint.
//!
//! Each upgraded socket is registered with [`Connections`] and served by a
//! sender task (channel → socket) and a receiver task; when either ends the
//! other is aborted. Outbound queues are bounded: a client whose queue is
//! full is evicted and its socket closed, so one stalled reader never holds
//! frames for everyone else. One fan-out task forwards hub events to every
//! connection; one heartbeat task pings them. If the fan-out falls behind
//! the hub, every connection is closed so clients reconnect and resync
//! rather than silently missing events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use rota_events::{ClientHello, SyncError, SyncHub};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::state::AppState;

/// Outbound frames queued per connection unless configured otherwise.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;

struct Connection {
    sender: mpsc::Sender<Message>,
    client_id: Option<Uuid>,
    connected_at: DateTime<Utc>,
}

/// Live WebSocket connections.
pub struct Connections {
    inner: RwLock<HashMap<Uuid, Connection>>,
    queue: usize,
}

impl Default for Connections {
    fn default() -> Self {
        Self::with_queue(DEFAULT_OUTBOUND_QUEUE)
    }
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections whose outbound queue holds at most `queue` frames.
    pub fn with_queue(queue: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            queue: queue.max(1),
        }
    }

    /// Register a connection and return the receiver for its outbound frames.
    pub async fn add(&self, conn_id: Uuid) -> mpsc::Receiver<Message> {
        let (sender, rx) = mpsc::channel(self.queue);
        self.inner.write().await.insert(
            conn_id,
            Connection {
                sender,
                client_id: None,
                connected_at: Utc::now(),
            },
        );
        rx
    }

    pub async fn remove(&self, conn_id: Uuid) {
        if let Some(conn) = self.inner.write().await.remove(&conn_id) {
            let secs = (Utc::now() - conn.connected_at).num_seconds();
            tracing::debug!(conn_id = %conn_id, client_id = ?conn.client_id, secs, "connection removed");
        }
    }

    pub async fn identify(&self, conn_id: Uuid, client_id: Uuid) {
        if let Some(conn) = self.inner.write().await.get_mut(&conn_id) {
            conn.client_id = Some(client_id);
        }
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Queue a frame for every connection. Returns how many accepted it.
    ///
    /// Never waits on a slow client: a full queue evicts the connection,
    /// which drops its sender and ends its socket.
    pub async fn broadcast(&self, message: Message) -> usize {
        let mut inner = self.inner.write().await;
        let mut accepted = 0;
        let mut evicted = Vec::new();
        for (conn_id, conn) in inner.iter() {
            match conn.sender.try_send(message.clone()) {
                Ok(()) => accepted += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(conn_id = %conn_id, client_id = ?conn.client_id, "outbound queue full, evicting client");
                    evicted.push(*conn_id);
                }
                Err(TrySendError::Closed(_)) => evicted.push(*conn_id),
            }
        }
        for conn_id in evicted {
            inner.remove(&conn_id);
        }
        accepted
    }

    pub async fn ping_all(&self) {
        self.broadcast(Message::Ping(Bytes::new())).await;
    }

    /// Ask every connection to close. Their handlers remove them.
    pub async fn close_all(&self) {
        self.broadcast(Message::Close(None)).await;
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.connections))
}

async fn handle_socket(socket: WebSocket, connections: Arc<Connections>) {
    let conn_id = Uuid::new_v4();
    tracing::info!(conn_id = %conn_id, "sync client connected");

    let mut rx = connections.add(conn_id).await;
    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || closing {
                return;
            }
        }
        // Evicted: the registry dropped our sender.
        let _ = sink.send(Message::Close(None)).await;
    });

    let identify = connections.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientHello>(text.as_str()) {
                    Ok(hello) => {
                        tracing::info!(conn_id = %conn_id, client_id = %hello.client_id, "sync client identified");
                        identify.identify(conn_id, hello.client_id).await;
                    }
                    Err(_) => tracing::debug!(conn_id = %conn_id, "ignoring client message"),
                },
                Ok(Message::Close(_)) => break,
                Ok(Message::Pong(_)) => tracing::trace!(conn_id = %conn_id, "pong"),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    connections.remove(conn_id).await;
    tracing::info!(conn_id = %conn_id, "sync client disconnected");
}

/// Forward hub events to every connection as JSON text frames.
pub fn start_fanout(hub: &SyncHub, connections: Arc<Connections>) -> tokio::task::JoinHandle<()> {
    let mut events = Box::pin(hub.stream());
    tokio::spawn(async move {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => {
                        let delivered = connections.broadcast(Message::Text(json.into())).await;
                        tracing::debug!(
                            event = event.event_type(),
                            change_set_id = %event.change_set_id(),
                            delivered,
                            "pushed schedule event"
                        );
                    }
                    Err(e) => tracing::error!(error = %e, "failed to encode schedule event"),
                },
                Err(SyncError::Lagged(missed)) => {
                    tracing::warn!(missed, "fan-out lagged, closing connections to force resync");
                    connections.close_all().await;
                }
                Err(e) => tracing::warn!(error = %e, "fan-out error"),
            }
        }
    })
}

/// Ping every connection on a fixed interval.
pub fn start_heartbeat(connections: Arc<Connections>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let count = connections.count().await;
            tracing::trace!(count, "heartbeat ping");
            connections.ping_all().await;
        }
    })
}
