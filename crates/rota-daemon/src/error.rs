//! HTTP error mapping.
//!
//! Every failure is returned as `{ "ok": false, "reason": <kind>, "message": <text> }`
//! where `reason` is the stable kind string of the underlying error.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rota_approval::ApprovalError;
use rota_changeset::ChangeSetError;
use rota_session::SessionError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    ChangeSet(#[from] ChangeSetError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The caller's role may not perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// The named collaborator has no URL configured.
    #[error("{0} is not configured")]
    Unavailable(&'static str),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::ChangeSet(e) => e.kind(),
            AppError::Session(e) => e.kind(),
            AppError::Approval(e) => e.kind(),
            AppError::BadRequest(_) => "bad_request",
            AppError::Forbidden(_) => "forbidden",
            AppError::Unavailable(_) => "collaborator_unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.reason())
    }
}

fn status_for(reason: &str) -> StatusCode {
    match reason {
        "stale_change_set" | "already_decided" => StatusCode::CONFLICT,
        "rule_conflict" | "duplicate_shift" | "infeasible" => StatusCode::UNPROCESSABLE_ENTITY,
        "not_found" | "request_not_found" | "session_not_found" => StatusCode::NOT_FOUND,
        "invalid_transition" | "not_applied" | "invalid_state" | "invalid_request"
        | "bad_request" => StatusCode::BAD_REQUEST,
        "forbidden" => StatusCode::FORBIDDEN,
        "collaborator" => StatusCode::BAD_GATEWAY,
        "collaborator_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let reason = self.reason();
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(reason, error = %self, "request failed");
            "an internal error occurred".to_string()
        } else {
            tracing::debug!(reason, error = %self, "request rejected");
            self.to_string()
        };

        let body = json!({
            "ok": false,
            "reason": reason,
            "message": message,
        });
        (status, axum::Json(body)).into_response()
    }
}
