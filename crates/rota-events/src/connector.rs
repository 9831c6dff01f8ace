//! Connection sources for the sync client.
//!
//! A [`Connector`] opens one push subscription and hands back its events as
//! a stream. The stream ending, or yielding an error, means the connection
//! is gone; the supervisor in [`crate::client`] owns reconnecting.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use rota_changeset::ScheduleEvent;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use uuid::Uuid;

use crate::error::SyncError;
use crate::hub::SyncHub;

/// Events from one live connection.
pub type EventStream = BoxStream<'static, Result<ScheduleEvent, SyncError>>;

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<EventStream, SyncError>;

    /// Where this connector points, for logs.
    fn describe(&self) -> String;
}

/// First frame a client sends after the WebSocket upgrade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename = "info")]
pub struct ClientHello {
    pub client_id: Uuid,
}

/// Subscribes to a daemon's `/ws/adjustments` endpoint.
pub struct WsConnector {
    url: String,
    client_id: Uuid,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_id: Uuid::new_v4(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<EventStream, SyncError> {
        let (mut ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SyncError::Connect(format!("{}: {}", self.url, e)))?;

        let hello = serde_json::to_string(&ClientHello {
            client_id: self.client_id,
        })?;
        ws.send(Message::Text(hello))
            .await
            .map_err(|e| SyncError::Protocol(e.to_string()))?;

        tracing::info!(url = %self.url, client_id = %self.client_id, "sync channel connected");
        Ok(ws
            .filter_map(|frame| futures::future::ready(decode_frame(frame)))
            .boxed())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Turn one WebSocket frame into an event, a disconnect, or nothing.
///
/// Frames that are not schedule events (heartbeats, server info) are skipped.
fn decode_frame(
    frame: Result<Message, tungstenite::Error>,
) -> Option<Result<ScheduleEvent, SyncError>> {
    match frame {
        Ok(Message::Text(text)) => match serde_json::from_str::<ScheduleEvent>(&text) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unrecognised sync frame");
                None
            }
        },
        Ok(Message::Close(reason)) => Some(Err(SyncError::ChannelDisconnected(match reason {
            Some(frame) => format!("closed by server: {}", frame.reason),
            None => "closed by server".to_string(),
        }))),
        Ok(_) => None,
        Err(e) => Some(Err(SyncError::ChannelDisconnected(e.to_string()))),
    }
}

/// Subscribes directly to an in-process hub. Used when the consumer runs
/// inside the daemon, and in tests.
pub struct HubConnector {
    hub: Arc<SyncHub>,
}

impl HubConnector {
    pub fn new(hub: Arc<SyncHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Connector for HubConnector {
    async fn connect(&self) -> Result<EventStream, SyncError> {
        Ok(self.hub.stream().boxed())
    }

    fn describe(&self) -> String {
        "in-process hub".to_string()
    }
}
