//! # rota-session
//!
//! The adjustment session state machine. Each client interaction owns one
//! [`AdjustmentSession`], which sequences rule acquisition, preview, and
//! apply/rollback over a shared [`rota_changeset::ChangeSetStore`] and
//! reconciles with push events by change-set id.

pub mod driver;
pub mod error;
pub mod session;

pub use driver::{submit_text, SessionRegistry, SharedSession};
pub use error::SessionError;
pub use session::{AdjustmentSession, SessionState, SubmitOutcome, SyncReaction, Ticket};
