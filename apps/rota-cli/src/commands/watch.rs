// watch.rs — Follow the sync channel and print schedule events.

use std::sync::Arc;

use clap::Args;
use rota_changeset::{ScheduleEvent, ScheduleSnapshot};
use rota_events::{BackoffConfig, ClientEvent, SyncClient, WsConnector};

use super::Daemon;

#[derive(Args)]
pub struct WatchArgs {
    /// First reconnect delay in milliseconds.
    #[arg(long, default_value_t = 500)]
    initial_ms: u64,
    /// Longest reconnect delay in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    max_ms: u64,
    /// Growth factor between attempts.
    #[arg(long, default_value_t = 2.0)]
    multiplier: f64,
    /// Use exact delays instead of randomized ones.
    #[arg(long)]
    no_jitter: bool,
}

impl WatchArgs {
    fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_ms: self.initial_ms,
            max_ms: self.max_ms,
            multiplier: self.multiplier,
            jitter: !self.no_jitter,
        }
    }
}

/// `http://host:port` → `ws://host:port/ws/adjustments`.
fn channel_url(daemon: &str) -> String {
    let base = daemon.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/ws/adjustments", base)
}

/// Last schedule version this watcher has read.
#[derive(Debug, Default)]
struct ScheduleView {
    version: Option<u64>,
}

impl ScheduleView {
    /// A reconnect may have dropped events, and an update names a version
    /// we have not read yet. Either way the schedule must be fetched again.
    fn needs_refresh(&self, event: &ClientEvent) -> bool {
        match event {
            ClientEvent::Connected { .. } => event.requires_resync() || self.version.is_none(),
            ClientEvent::Event(ScheduleEvent::ScheduleUpdated {
                schedule_version, ..
            }) => self.version != Some(*schedule_version),
            _ => false,
        }
    }

    async fn refresh(&mut self, daemon: &Daemon) {
        match daemon.get::<ScheduleSnapshot>("/api/shifts").await {
            Ok(snapshot) => {
                println!(
                    "  schedule at version {} ({} shifts)",
                    snapshot.schedule_version,
                    snapshot.shifts.len()
                );
                self.version = Some(snapshot.schedule_version);
            }
            // Left unset so the next connect or update tries again.
            Err(e) => {
                tracing::warn!(error = %e, "could not re-read the schedule");
                self.version = None;
            }
        }
    }
}

pub async fn execute(daemon: &Daemon, daemon_url: &str, args: WatchArgs) -> anyhow::Result<()> {
    let url = channel_url(daemon_url);
    let mut client = SyncClient::spawn(Arc::new(WsConnector::new(url.clone())), args.backoff());
    println!("Watching {} (Ctrl-C to stop)", url);
    let mut view = ScheduleView::default();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = client.recv() => match event {
                Some(event) => {
                    print_event(&event);
                    if view.needs_refresh(&event) {
                        view.refresh(daemon).await;
                    }
                }
                None => break,
            },
        }
    }

    client.shutdown().await;
    Ok(())
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::Connected { attempt } => {
            println!("connected (attempt {})", attempt);
            if event.requires_resync() {
                println!("  events may have been missed; re-reading the schedule");
            }
        }
        ClientEvent::Event(e) => println!("{} {}", e.event_type(), e.change_set_id()),
        ClientEvent::Disconnected { reason } => println!("disconnected: {}", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_urls_become_ws_urls() {
        assert_eq!(
            channel_url("http://127.0.0.1:8080/"),
            "ws://127.0.0.1:8080/ws/adjustments"
        );
        assert_eq!(
            channel_url("https://rota.example.com"),
            "wss://rota.example.com/ws/adjustments"
        );
    }

    #[test]
    fn flags_fill_backoff() {
        let args = WatchArgs {
            initial_ms: 100,
            max_ms: 1_000,
            multiplier: 3.0,
            no_jitter: true,
        };
        let backoff = args.backoff();
        assert_eq!(backoff.initial_ms, 100);
        assert!(!backoff.jitter);
    }

    #[test]
    fn reconnect_and_new_versions_trigger_a_refetch() {
        let change_set_id = uuid::Uuid::new_v4();
        let updated = |schedule_version| {
            ClientEvent::Event(ScheduleEvent::ScheduleUpdated {
                change_set_id,
                schedule_version,
            })
        };
        let mut view = ScheduleView::default();
        assert!(view.needs_refresh(&ClientEvent::Connected { attempt: 1 }));

        view.version = Some(4);
        assert!(!view.needs_refresh(&ClientEvent::Connected { attempt: 1 }));
        assert!(view.needs_refresh(&ClientEvent::Connected { attempt: 2 }));
        assert!(!view.needs_refresh(&updated(4)));
        assert!(view.needs_refresh(&updated(5)));
        assert!(!view.needs_refresh(&ClientEvent::Event(ScheduleEvent::ProposalsReady {
            change_set_id
        })));
        assert!(!view.needs_refresh(&ClientEvent::Disconnected {
            reason: "closed".into()
        }));
    }
}
