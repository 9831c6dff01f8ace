// reconnect.rs — The sync client survives dropped and refused connections.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rota_changeset::ScheduleEvent;
use rota_events::{
    BackoffConfig, ClientEvent, Connector, EventStream, HubConnector, SyncClient, SyncError,
    SyncHub,
};
use uuid::Uuid;

/// Plays back one scripted outcome per connect attempt, then hangs.
struct Scripted {
    attempts: Mutex<VecDeque<Result<Vec<Result<ScheduleEvent, SyncError>>, SyncError>>>,
}

#[async_trait]
impl Connector for Scripted {
    async fn connect(&self) -> Result<EventStream, SyncError> {
        let next = self.attempts.lock().unwrap().pop_front();
        match next {
            Some(Ok(events)) => Ok(futures::stream::iter(events).boxed()),
            Some(Err(e)) => Err(e),
            None => Ok(futures::stream::pending::<Result<ScheduleEvent, SyncError>>().boxed()),
        }
    }

    fn describe(&self) -> String {
        "scripted".into()
    }
}

fn fast() -> BackoffConfig {
    BackoffConfig {
        initial_ms: 1,
        max_ms: 5,
        multiplier: 2.0,
        jitter: false,
    }
}

async fn next(client: &mut SyncClient) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), client.recv())
        .await
        .expect("client stalled")
        .expect("client closed")
}

#[tokio::test]
async fn reconnects_after_refusal_and_drop() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let connector = Arc::new(Scripted {
        attempts: Mutex::new(VecDeque::from(vec![
            Err(SyncError::Connect("refused".into())),
            Ok(vec![
                Ok(ScheduleEvent::ProposalsReady { change_set_id: a }),
                Err(SyncError::ChannelDisconnected("reset".into())),
            ]),
            Ok(vec![Ok(ScheduleEvent::ScheduleUpdated {
                change_set_id: b,
                schedule_version: 3,
            })]),
        ])),
    });

    let mut client = SyncClient::spawn(connector, fast());

    assert_eq!(next(&mut client).await, ClientEvent::Connected { attempt: 1 });
    assert_eq!(
        next(&mut client).await,
        ClientEvent::Event(ScheduleEvent::ProposalsReady { change_set_id: a })
    );
    match next(&mut client).await {
        ClientEvent::Disconnected { reason } => assert!(reason.contains("reset")),
        other => panic!("expected disconnect, got {:?}", other),
    }

    let reconnected = next(&mut client).await;
    assert_eq!(reconnected, ClientEvent::Connected { attempt: 2 });
    assert!(reconnected.requires_resync());
    assert_eq!(
        next(&mut client).await,
        ClientEvent::Event(ScheduleEvent::ScheduleUpdated {
            change_set_id: b,
            schedule_version: 3
        })
    );
    // The third stream ends cleanly; the client reports it and moves on.
    assert!(matches!(
        next(&mut client).await,
        ClientEvent::Disconnected { .. }
    ));
    assert_eq!(next(&mut client).await, ClientEvent::Connected { attempt: 3 });

    client.shutdown().await;
}

#[tokio::test]
async fn hub_events_reach_the_client() {
    let hub = Arc::new(SyncHub::default());
    let mut client = SyncClient::spawn(Arc::new(HubConnector::new(hub.clone())), fast());
    assert_eq!(next(&mut client).await, ClientEvent::Connected { attempt: 1 });

    let id = Uuid::new_v4();
    hub.publish(ScheduleEvent::ProposalsReady { change_set_id: id });
    assert_eq!(
        next(&mut client).await,
        ClientEvent::Event(ScheduleEvent::ProposalsReady { change_set_id: id })
    );
    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_the_event_channel() {
    let connector = Arc::new(Scripted {
        attempts: Mutex::new(VecDeque::new()),
    });
    let mut client = SyncClient::spawn(connector, fast());
    assert_eq!(next(&mut client).await, ClientEvent::Connected { attempt: 1 });
    client.shutdown().await;
}
