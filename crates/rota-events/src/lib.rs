//! # rota-events
//!
//! The sync channel: a server-side [`SyncHub`] that fans schedule events out
//! to every connection, and a client-side [`SyncClient`] that keeps one
//! subscription alive with backoff and reports connects, events and
//! disconnects on a channel.

pub mod backoff;
pub mod client;
pub mod connector;
pub mod error;
pub mod hub;

pub use backoff::{Backoff, BackoffConfig};
pub use client::{ClientEvent, SyncClient};
pub use connector::{ClientHello, Connector, EventStream, HubConnector, WsConnector};
pub use error::SyncError;
pub use hub::SyncHub;
