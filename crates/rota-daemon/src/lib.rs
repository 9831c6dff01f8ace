//! # rota-daemon
//!
//! HTTP and WebSocket service for roster adjustments. Hosts the shared
//! change-set store, adjustment sessions and the approval workflow, and
//! pushes schedule events to subscribed clients on `/ws/adjustments`.

pub mod auth;
pub mod clients;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::DaemonConfig;
pub use error::{AppError, AppResult};
pub use state::AppState;

/// The full application router with request tracing.
pub fn app(state: AppState) -> Router {
    routes::router(state).layer(TraceLayer::new_for_http())
}
