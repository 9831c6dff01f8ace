// error.rs — Error types for the sync channel.

use thiserror::Error;

/// Errors raised by connectors and the sync client.
///
/// None of these reach the consumer directly: the supervisor turns them into
/// `ClientEvent::Disconnected` and reconnects.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The push connection dropped. Transient; the client reconnects and the
    /// consumer must re-fetch the schedule.
    #[error("channel disconnected: {0}")]
    ChannelDisconnected(String),

    /// The connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The subscriber fell behind and missed events.
    #[error("subscriber lagged, {0} events missed")]
    Lagged(u64),

    /// A frame could not be sent or understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the error ends the current connection.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            SyncError::ChannelDisconnected(_) | SyncError::Lagged(_) | SyncError::Protocol(_)
        )
    }
}
