//! HTTP routes.
//!
//! Successful mutations answer `{ "ok": true, ... }`; failures go through
//! [`AppError`] and answer `{ "ok": false, "reason": ... }`.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use rota_approval::{NewRequest, RequestPreview, RequestStatus, ShiftChangeRequest};
use rota_changeset::{
    generate_baseline, week_range_containing, AdjustmentRule, ChangeSetRecord, OptimizeRequest,
    ParseRequest, ParseResponse, Preview, Roster, ScheduleSnapshot,
};
use rota_session::{submit_text, AdjustmentSession, SubmitOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::RequireAdmin;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::ws::ws_handler;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/shifts", get(get_shifts))
        .route("/api/shifts/generate", post(generate))
        .route("/api/roster", get(get_roster).put(put_roster))
        .route("/api/adjustments/parse", post(parse))
        .route("/api/adjustments/preview", post(preview))
        .route("/api/adjustments/apply", post(apply))
        .route("/api/adjustments/rollback", post(rollback))
        .route("/api/adjustments/discard", post(discard))
        .route("/api/change-sets", get(list_change_sets))
        .route("/api/change-sets/{id}", get(get_change_set))
        .route("/api/sessions", post(open_session))
        .route("/api/sessions/{id}", get(get_session).delete(close_session))
        .route("/api/sessions/{id}/submit", post(session_submit))
        .route("/api/sessions/{id}/apply", post(session_apply))
        .route("/api/sessions/{id}/discard", post(session_discard))
        .route("/api/sessions/{id}/rollback", post(session_rollback))
        .route("/api/shift-change", post(submit_request).get(list_requests))
        .route("/api/shift-change/{id}", get(get_request))
        .route("/api/shift-change/{id}/preview", get(preview_request))
        .route("/api/shift-change/{id}/approve", post(approve_request))
        .route("/api/shift-change/{id}/reject", post(reject_request))
        .route("/ws/adjustments", get(ws_handler))
        .with_state(state)
}

/// `{ "ok": true }` merged with the payload's fields.
#[derive(Serialize)]
pub struct Ack<T> {
    ok: bool,
    #[serde(flatten)]
    body: T,
}

fn ack<T>(body: T) -> Json<Ack<T>> {
    Json(Ack { ok: true, body })
}

async fn healthz(State(state): State<AppState>) -> AppResult<Json<Value>> {
    Ok(Json(json!({
        "ok": true,
        "schedule_version": state.changesets.shift_store().version()?,
        "sessions": state.sessions.len().await,
        "connections": state.connections.count().await,
    })))
}

// ── Schedule ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ShiftsQuery {
    /// Any date in the wanted week.
    week_of: Option<NaiveDate>,
}

async fn get_shifts(
    State(state): State<AppState>,
    Query(query): Query<ShiftsQuery>,
) -> AppResult<Json<ScheduleSnapshot>> {
    let mut snapshot = state.changesets.shift_store().snapshot()?;
    if let Some(date) = query.week_of {
        snapshot.shifts = snapshot.week(week_range_containing(date));
    }
    Ok(Json(snapshot))
}

async fn generate(
    State(state): State<AppState>,
    Json(mut request): Json<OptimizeRequest>,
) -> AppResult<Json<Ack<Value>>> {
    let optimizer = state.optimizer.clone().ok_or(AppError::Unavailable("optimizer"))?;
    if request.week_end < request.week_start {
        return Err(AppError::BadRequest("week_end is before week_start".into()));
    }
    if request.employee_ids.is_empty() {
        request.employee_ids = state
            .changesets
            .roster()?
            .employees()
            .iter()
            .map(|e| e.id)
            .collect();
    }
    let version = generate_baseline(optimizer.as_ref(), state.changesets.shift_store(), &request).await?;
    tracing::info!(week_start = %request.week_start, version, "baseline loaded");
    Ok(ack(json!({ "schedule_version": version })))
}

async fn get_roster(State(state): State<AppState>) -> AppResult<Json<Roster>> {
    Ok(Json(state.changesets.roster()?))
}

async fn put_roster(
    State(state): State<AppState>,
    Json(roster): Json<Roster>,
) -> AppResult<Json<Ack<Value>>> {
    let size = roster.len();
    state.changesets.set_roster(roster)?;
    Ok(ack(json!({ "employees": size })))
}

// ── Adjustments ─────────────────────────────────────────────────

async fn parse(
    State(state): State<AppState>,
    Json(request): Json<ParseRequest>,
) -> AppResult<Json<ParseResponse>> {
    let parser = state.parser.clone().ok_or(AppError::Unavailable("rule parser"))?;
    Ok(Json(parser.parse(&request).await?))
}

#[derive(Deserialize)]
struct PreviewBody {
    rule: AdjustmentRule,
    #[serde(default)]
    session_id: Option<Uuid>,
}

async fn preview(
    State(state): State<AppState>,
    Json(body): Json<PreviewBody>,
) -> AppResult<Json<Preview>> {
    Ok(Json(state.changesets.propose(body.session_id, body.rule)?))
}

#[derive(Deserialize)]
struct ChangeSetBody {
    change_set_id: Uuid,
}

async fn apply(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Json(body): Json<ChangeSetBody>,
) -> AppResult<Json<Ack<rota_changeset::ApplyReceipt>>> {
    Ok(ack(state
        .changesets
        .apply_as(body.change_set_id, Some(&admin.actor))?))
}

async fn rollback(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Json(body): Json<ChangeSetBody>,
) -> AppResult<Json<Ack<rota_changeset::RollbackReceipt>>> {
    Ok(ack(state
        .changesets
        .rollback_as(body.change_set_id, Some(&admin.actor))?))
}

async fn discard(
    State(state): State<AppState>,
    Json(body): Json<ChangeSetBody>,
) -> AppResult<Json<Ack<Value>>> {
    state.changesets.discard(body.change_set_id)?;
    Ok(ack(json!({ "change_set_id": body.change_set_id })))
}

#[derive(Deserialize)]
struct StateQuery {
    state: Option<String>,
}

async fn list_change_sets(
    State(state): State<AppState>,
    Query(query): Query<StateQuery>,
) -> AppResult<Json<Vec<ChangeSetRecord>>> {
    Ok(Json(state.changesets.list(query.state.as_deref())?))
}

async fn get_change_set(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ChangeSetRecord>> {
    Ok(Json(state.changesets.get(id)?))
}

// ── Sessions ────────────────────────────────────────────────────

async fn open_session(State(state): State<AppState>) -> Json<AdjustmentSession> {
    let session = state.sessions.create().await;
    let snapshot = session.lock().await.clone();
    Json(snapshot)
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AdjustmentSession>> {
    let session = state.sessions.get(id).await?;
    let snapshot = session.lock().await.clone();
    Ok(Json(snapshot))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Ack<Value>>> {
    state.sessions.close(id, &state.changesets).await?;
    Ok(ack(json!({ "session_id": id })))
}

/// Either free text for the parser or an already structured rule.
#[derive(Deserialize)]
#[serde(untagged)]
enum SubmitBody {
    Rule { rule: AdjustmentRule },
    Text { free_text: String },
}

async fn session_submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SubmitBody>,
) -> AppResult<Json<SubmitOutcome>> {
    let session = state.sessions.get(id).await?;
    let outcome = match body {
        SubmitBody::Rule { rule } => session.lock().await.submit_rule(rule, &state.changesets)?,
        SubmitBody::Text { free_text } => {
            let parser = state.parser.clone().ok_or(AppError::Unavailable("rule parser"))?;
            submit_text(&session, parser.as_ref(), &state.changesets, &free_text).await?
        }
    };
    Ok(Json(outcome))
}

async fn session_apply(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Ack<rota_changeset::ApplyReceipt>>> {
    let session = state.sessions.get(id).await?;
    let receipt = session
        .lock()
        .await
        .apply_as(&state.changesets, Some(&admin.actor))?;
    Ok(ack(receipt))
}

async fn session_discard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Ack<Value>>> {
    let session = state.sessions.get(id).await?;
    session.lock().await.discard(&state.changesets)?;
    Ok(ack(json!({ "session_id": id })))
}

async fn session_rollback(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Ack<Value>>> {
    let session = state.sessions.get(id).await?;
    let receipt = session
        .lock()
        .await
        .rollback_as(&state.changesets, Some(&admin.actor))?;
    Ok(ack(json!({ "session_id": id, "receipt": receipt })))
}

// ── Shift change requests ───────────────────────────────────────

async fn submit_request(
    State(state): State<AppState>,
    Json(body): Json<NewRequest>,
) -> AppResult<Json<ShiftChangeRequest>> {
    Ok(Json(state.approvals.submit(body)?))
}

#[derive(Deserialize)]
struct StatusQuery {
    status: Option<String>,
}

#[derive(Serialize)]
struct RequestList {
    requests: Vec<ShiftChangeRequest>,
    total: usize,
}

async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> AppResult<Json<RequestList>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<RequestStatus>)
        .transpose()?;
    let requests = state.approvals.list(status)?;
    Ok(Json(RequestList {
        total: requests.len(),
        requests,
    }))
}

async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ShiftChangeRequest>> {
    Ok(Json(state.approvals.get(id)?))
}

async fn preview_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RequestPreview>> {
    Ok(Json(state.approvals.preview(id).await?))
}

#[derive(Deserialize, Default)]
struct DecisionBody {
    #[serde(default)]
    decided_by: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

async fn approve_request(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionBody>>,
) -> AppResult<Json<Ack<ShiftChangeRequest>>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let decided_by = body.decided_by.or(Some(admin.actor));
    Ok(ack(state.approvals.approve(id, decided_by)?))
}

async fn reject_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionBody>>,
) -> AppResult<Json<Ack<ShiftChangeRequest>>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    Ok(ack(state.approvals.reject(id, body.decided_by, body.reason)?))
}
