//! Role gate for endpoints that write the schedule.
//!
//! The caller's role comes from the `X-Role` header and only `admin` may
//! commit, roll back or approve. `X-Actor` optionally names the caller; the
//! name is recorded on the change-set and in the audit trail.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

pub const ROLE_HEADER: &str = "x-role";
pub const ACTOR_HEADER: &str = "x-actor";
pub const ROLE_ADMIN: &str = "admin";

/// Requires `X-Role: admin`. Rejects with 403 otherwise.
///
/// ```ignore
/// async fn apply(RequireAdmin { actor }: RequireAdmin) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAdmin {
    /// `X-Actor` when given, otherwise the role itself.
    pub actor: String,
}

impl<S: Send + Sync> FromRequestParts<S> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let role = header(parts, ROLE_HEADER);
        if role.as_deref() != Some(ROLE_ADMIN) {
            tracing::debug!(role = ?role, path = %parts.uri.path(), "admin role required");
            return Err(AppError::Forbidden("admin role required"));
        }
        let actor = header(parts, ACTOR_HEADER).unwrap_or_else(|| ROLE_ADMIN.to_string());
        Ok(Self { actor })
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
