//! # rota-approval
//!
//! Review of employee-submitted shift change requests. Requests are stored
//! one JSON file each, previewed through the change-set engine with ranked
//! fill-in suggestions for vacated slots, and approved (committing the
//! change-set) or rejected. Both decisions are terminal.

pub mod error;
pub mod ranker;
pub mod request;
pub mod store;
pub mod workflow;

pub use error::ApprovalError;
pub use ranker::LoadBalancingRanker;
pub use request::{NewRequest, RequestKind, RequestStatus, ShiftChangeRequest};
pub use store::RequestStore;
pub use workflow::{ApprovalWorkflow, RequestPreview, Suggestion, DEFAULT_DISPLAY_CANDIDATES};
