//! Router-level tests: requests are driven in-process through `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use http_body_util::BodyExt;
use rota_approval::{LoadBalancingRanker, RequestStore};
use rota_changeset::{Employee, Roster, Shift, TimeSlot};
use rota_daemon::{app, AppState, DaemonConfig};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn test_state(dir: &TempDir) -> AppState {
    let requests = RequestStore::new(dir.path().join("requests")).unwrap();
    let state = AppState::with_parts(
        DaemonConfig::default(),
        requests,
        Arc::new(LoadBalancingRanker::new()),
        false,
    )
    .unwrap();
    state
        .changesets
        .set_roster(Roster::new(vec![
            Employee::new(1, "Aoki Mei"),
            Employee::new(2, "Baba Ren"),
            Employee::new(3, "Chiba Yu"),
        ]))
        .unwrap();
    state
        .changesets
        .shift_store()
        .load(vec![
            Shift::new(1, day("2024-06-04"), TimeSlot::Early),
            Shift::new(2, day("2024-06-04"), TimeSlot::Late),
            Shift::new(3, day("2024-06-05"), TimeSlot::Early),
        ])
        .unwrap();
    state
}

/// Requests as an admin, the role every schedule write needs.
async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with(app, &[("x-role", "admin")], method, uri, body).await
}

async fn send_with(
    app: &Router,
    headers: &[(&str, &str)],
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn absence_rule(employee_id: i64, date: &str) -> Value {
    json!({ "rule": { "action": "absence", "employee_id": employee_id, "date": date } })
}

#[tokio::test]
async fn healthz_reports_version() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(&dir));
    let (status, body) = send(&app, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["schedule_version"], 1);
}

#[tokio::test]
async fn preview_apply_rollback_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(&dir));

    let (status, preview) = send(
        &app,
        Method::POST,
        "/api/adjustments/preview",
        Some(absence_rule(1, "2024-06-04")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["removed"].as_array().unwrap().len(), 1);
    assert_eq!(preview["week_start"], "2024-06-03");
    let id = preview["change_set"]["id"].clone();

    let (status, applied) = send(
        &app,
        Method::POST,
        "/api/adjustments/apply",
        Some(json!({ "change_set_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(applied["ok"], true);
    assert_eq!(applied["version_id"], 2);
    assert!(applied["applied_at"].is_string());

    let (status, again) = send(
        &app,
        Method::POST,
        "/api/adjustments/apply",
        Some(json!({ "change_set_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(again["ok"], false);
    assert_eq!(again["reason"], "invalid_transition");

    let (status, rolled) = send(
        &app,
        Method::POST,
        "/api/adjustments/rollback",
        Some(json!({ "change_set_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rolled["ok"], true);

    let (_, shifts) = send(&app, Method::GET, "/api/shifts?week_of=2024-06-05", None).await;
    assert_eq!(shifts["schedule_version"], 3);
    assert_eq!(shifts["shifts"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn second_apply_against_same_version_is_stale() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(&dir));

    let (_, first) = send(&app, Method::POST, "/api/adjustments/preview", Some(absence_rule(1, "2024-06-04"))).await;
    let (_, second) = send(&app, Method::POST, "/api/adjustments/preview", Some(absence_rule(3, "2024-06-05"))).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/adjustments/apply",
        Some(json!({ "change_set_id": first["change_set"]["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/adjustments/apply",
        Some(json!({ "change_set_id": second["change_set"]["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["reason"], "stale_change_set");
}

#[tokio::test]
async fn unknown_employee_is_unprocessable() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(&dir));
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/adjustments/preview",
        Some(absence_rule(99, "2024-06-04")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["reason"], "rule_conflict");
}

#[tokio::test]
async fn unconfigured_parser_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(&dir));
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/adjustments/parse",
        Some(json!({ "free_text": "Aoki is off Tuesday" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["reason"], "collaborator_unavailable");
}

#[tokio::test]
async fn shift_change_request_review() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(&dir));

    let (status, request) = send(
        &app,
        Method::POST,
        "/api/shift-change",
        Some(json!({
            "type": "absence",
            "employee_name": "Aoki",
            "date": "2024-06-04",
            "reason": "hospital visit",
            "requested_via": "web"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["status"], "pending");
    assert_eq!(request["employee_id"], 1);
    let id = request["id"].as_str().unwrap().to_string();

    let (_, listed) = send(&app, Method::GET, "/api/shift-change?status=pending", None).await;
    assert_eq!(listed["total"], 1);

    let (status, preview) = send(&app, Method::GET, &format!("/api/shift-change/{id}/preview"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["removed"].as_array().unwrap().len(), 1);
    assert_eq!(preview["suggestions"][0]["time_slot"], "08-16");
    assert_eq!(preview["suggestions"][0]["candidates"][0]["employee_id"], 3);

    let (status, approved) = send(&app, Method::POST, &format!("/api/shift-change/{id}/approve"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/shift-change/{id}/reject"),
        Some(json!({ "reason": "too late" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["reason"], "already_decided");

    let (status, _) = send(&app, Method::GET, "/api/shift-change?status=done", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_lifecycle_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(&dir));

    let (_, session) = send(&app, Method::POST, "/api/sessions", None).await;
    assert_eq!(session["state"]["state"], "idle");
    let id = session["session_id"].as_str().unwrap().to_string();

    let (status, outcome) = send(
        &app,
        Method::POST,
        &format!("/api/sessions/{id}/submit"),
        Some(absence_rule(2, "2024-06-04")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "preview");

    let (status, _) = send(&app, Method::POST, &format!("/api/sessions/{id}/apply"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, session) = send(&app, Method::GET, &format!("/api/sessions/{id}"), None).await;
    assert_eq!(session["state"]["state"], "applied");

    let (status, _) = send(&app, Method::POST, &format!("/api/sessions/{id}/rollback"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, session) = send(&app, Method::GET, &format!("/api/sessions/{id}"), None).await;
    assert_eq!(session["state"]["state"], "rolled_back");

    let (status, _) = send(&app, Method::POST, &format!("/api/sessions/{id}/apply"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, Method::GET, &format!("/api/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["reason"], "session_not_found");
}

#[tokio::test]
async fn schedule_writes_require_the_admin_role() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(&dir));

    let (_, preview) = send(&app, Method::POST, "/api/adjustments/preview", Some(absence_rule(1, "2024-06-04"))).await;
    let id = preview["change_set"]["id"].clone();
    let body = json!({ "change_set_id": id });

    let anonymous: &[(&str, &str)] = &[];
    let staff: &[(&str, &str)] = &[("x-role", "staff")];
    for headers in [anonymous, staff] {
        let (status, denied) = send_with(&app, headers, Method::POST, "/api/adjustments/apply", Some(body.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(denied["ok"], false);
        assert_eq!(denied["reason"], "forbidden");
    }
    let (_, shifts) = send(&app, Method::GET, "/api/shifts", None).await;
    assert_eq!(shifts["schedule_version"], 1);

    let (status, _) = send_with(
        &app,
        &[("x-role", "admin"), ("x-actor", "manager")],
        Method::POST,
        "/api/adjustments/apply",
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, record) = send(&app, Method::GET, &format!("/api/change-sets/{}", id.as_str().unwrap()), None).await;
    assert_eq!(record["state"]["state"], "applied");
    assert_eq!(record["state"]["applied_by"], "manager");

    let (status, _) = send_with(&app, &[], Method::POST, "/api/adjustments/rollback", Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, Method::POST, "/api/adjustments/rollback", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, record) = send(&app, Method::GET, &format!("/api/change-sets/{}", id.as_str().unwrap()), None).await;
    assert_eq!(record["state"]["rolled_back_by"], "admin");
}

#[tokio::test]
async fn session_apply_and_approval_require_the_admin_role() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(&dir));

    let (_, session) = send(&app, Method::POST, "/api/sessions", None).await;
    let sid = session["session_id"].as_str().unwrap().to_string();
    send(&app, Method::POST, &format!("/api/sessions/{sid}/submit"), Some(absence_rule(1, "2024-06-04"))).await;
    let (status, _) = send_with(&app, &[], Method::POST, &format!("/api/sessions/{sid}/apply"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, session) = send(&app, Method::GET, &format!("/api/sessions/{sid}"), None).await;
    assert_eq!(session["state"]["state"], "previewing");

    let (_, request) = send(
        &app,
        Method::POST,
        "/api/shift-change",
        Some(json!({ "type": "absence", "employee_name": "Chiba", "date": "2024-06-05" })),
    )
    .await;
    let rid = request["id"].as_str().unwrap().to_string();
    let (status, _) = send_with(&app, &[("x-role", "staff")], Method::POST, &format!("/api/shift-change/{rid}/approve"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, stored) = send(&app, Method::GET, &format!("/api/shift-change/{rid}"), None).await;
    assert_eq!(stored["status"], "pending");
}
