//! Server-side fan-out for schedule events.
//!
//! [`SyncHub`] wraps a `tokio::sync::broadcast` channel. The change-set store
//! dispatches into it through [`NotificationSink`]; every WebSocket
//! connection holds its own receiver. Slow receivers observe a lag instead of
//! blocking publishers.

use rota_changeset::{ChangeSetError, NotificationSink, ScheduleEvent};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::SyncError;

/// Default buffer capacity for the broadcast channel.
pub const DEFAULT_CAPACITY: usize = 256;

/// In-process publish/subscribe hub for [`ScheduleEvent`]s.
#[derive(Debug, Clone)]
pub struct SyncHub {
    sender: broadcast::Sender<ScheduleEvent>,
}

impl SyncHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped if nobody is listening.
    pub fn publish(&self, event: ScheduleEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleEvent> {
        self.sender.subscribe()
    }

    /// A subscription as a stream. A lag surfaces as [`SyncError::Lagged`].
    pub fn stream(&self) -> impl Stream<Item = Result<ScheduleEvent, SyncError>> + Send + 'static {
        BroadcastStream::new(self.sender.subscribe()).map(|item| {
            item.map_err(|e| match e {
                BroadcastStreamRecvError::Lagged(n) => SyncError::Lagged(n),
            })
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationSink for SyncHub {
    fn send(&self, event: &ScheduleEvent) -> Result<(), ChangeSetError> {
        self.publish(event.clone());
        Ok(())
    }
}
