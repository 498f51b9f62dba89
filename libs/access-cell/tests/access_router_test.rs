use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body, BodyDataStream},
    http::{Request, StatusCode},
    Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use access_cell::create_access_router;
use shared_database::{InMemoryRecordStore, PortalContext, Query, RecordStore};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct Harness {
    app: Router,
    store: Arc<InMemoryRecordStore>,
    doctor_token: String,
    patient_token: String,
    patient: TestUser,
}

async fn harness() -> Harness {
    let config = TestConfig::default();
    let (ctx, store) = PortalContext::in_memory(config.to_arc());
    let doctor = TestUser::doctor("grey@example.com");
    let patient = TestUser::patient("pat@example.com");

    store
        .insert("patients", json!({ "id": "pp1", "user_id": patient.id, "name": "Pat Jones" }), None)
        .await
        .unwrap();

    Harness {
        app: create_access_router(ctx),
        doctor_token: JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, None),
        patient_token: JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None),
        store,
        patient,
    }
}

fn request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_request_approve_and_view_records() {
    let h = harness().await;

    let response = h
        .app
        .clone()
        .oneshot(request("POST", "/requests", &h.doctor_token, Some(json!({
            "patient_id": h.patient.id,
            "request_type": "all"
        }))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["status"], "pending");

    let duplicate = h
        .app
        .clone()
        .oneshot(request("POST", "/requests", &h.doctor_token, Some(json!({ "patient_id": h.patient.id }))))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let pending = json_body(
        h.app
            .clone()
            .oneshot(request("GET", "/requests/pending", &h.patient_token, None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(pending["total"], 1);
    assert_eq!(pending["requests"][0]["doctor_name"], "Unknown Doctor");

    let uri = format!("/requests/{}/approve", created["id"].as_str().unwrap());
    let approved = h.app.clone().oneshot(request("POST", &uri, &h.patient_token, None)).await.unwrap();
    assert_eq!(approved.status(), StatusCode::OK);

    let again = h.app.clone().oneshot(request("POST", &uri, &h.patient_token, None)).await.unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let visibility = json_body(
        h.app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/visibility/{}?resource=profile", h.patient.id),
                &h.doctor_token,
                None,
            ))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(visibility["visible"], true);

    let records = json_body(
        h.app
            .oneshot(request("GET", &format!("/patients/{}/records", h.patient.id), &h.doctor_token, None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(records["profile"]["name"], "Pat Jones");
    assert_eq!(records["reports"], json!([]));
}

#[tokio::test]
async fn test_board_starts_with_request_access() {
    let h = harness().await;
    let board = json_body(
        h.app
            .oneshot(request("GET", "/board", &h.doctor_token, None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(board["total"], 1);
    assert_eq!(board["patients"][0]["badge"], "request_access");
}

#[tokio::test]
async fn test_roles_are_enforced() {
    let h = harness().await;

    let as_patient = h
        .app
        .clone()
        .oneshot(request("POST", "/requests", &h.patient_token, Some(json!({ "patient_id": "x" }))))
        .await
        .unwrap();
    assert_eq!(as_patient.status(), StatusCode::FORBIDDEN);

    let as_doctor = h
        .app
        .clone()
        .oneshot(request("GET", "/requests/pending", &h.doctor_token, None))
        .await
        .unwrap();
    assert_eq!(as_doctor.status(), StatusCode::FORBIDDEN);

    let anonymous = h
        .app
        .oneshot(Request::builder().uri("/board").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_records_forbidden_without_approval() {
    let h = harness().await;
    let response = h
        .app
        .oneshot(request("GET", &format!("/patients/{}/records", h.patient.id), &h.doctor_token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

async fn next_event(body: &mut BodyDataStream) -> (String, Value) {
    let frame = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .expect("no event within timeout")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    let field = |name: &str| {
        text.lines()
            .find_map(|line| line.strip_prefix(name))
            .map(|value| value.trim().to_string())
            .unwrap()
    };
    (field("event:"), serde_json::from_str(&field("data:")).unwrap())
}

async fn open_live(h: &Harness, token: &str) -> BodyDataStream {
    let response = h.app.clone().oneshot(request("GET", "/live", token, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    response.into_body().into_data_stream()
}

async fn open_request(h: &Harness) -> String {
    let response = h
        .app
        .clone()
        .oneshot(request("POST", "/requests", &h.doctor_token, Some(json!({ "patient_id": h.patient.id }))))
        .await
        .unwrap();
    json_body(response).await["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_live_stream_keeps_patient_pending_list_current() {
    let h = harness().await;
    let mut live = open_live(&h, &h.patient_token).await;

    let (name, opening) = next_event(&mut live).await;
    assert_eq!(name, "snapshot");
    assert_eq!(opening, json!({ "role": "patient", "pending": [] }));

    // Someone else's request must not reach this patient.
    h.store
        .insert("access_requests", json!({
            "id": "other", "doctor_id": "d9", "patient_id": "someone-else",
            "request_type": "all", "status": "pending"
        }), None)
        .await
        .unwrap();
    let request_id = open_request(&h).await;

    let (name, opened) = next_event(&mut live).await;
    assert_eq!(name, "access_request");
    assert_eq!(opened["change"]["kind"], "insert");
    assert_eq!(opened["change"]["row"]["patient_id"], json!(h.patient.id));
    assert_eq!(opened["snapshot"]["pending"][0]["id"], json!(request_id));
    assert!(!opened.to_string().contains("someone-else"));

    let uri = format!("/requests/{}/approve", request_id);
    let approved = h.app.clone().oneshot(request("POST", &uri, &h.patient_token, None)).await.unwrap();
    assert_eq!(approved.status(), StatusCode::OK);

    let (_, decided) = next_event(&mut live).await;
    assert_eq!(decided["change"]["kind"], "update");
    assert_eq!(decided["snapshot"]["pending"], json!([]));

    h.store
        .delete("access_requests", &Query::new().eq("id", &request_id), None)
        .await
        .unwrap();
    let (_, deleted) = next_event(&mut live).await;
    assert_eq!(deleted["change"]["kind"], "delete");
    assert_eq!(deleted["change"]["row_id"], json!(request_id));
}

#[tokio::test]
async fn test_live_stream_moves_doctor_badge() {
    let h = harness().await;
    let mut live = open_live(&h, &h.doctor_token).await;

    let (_, opening) = next_event(&mut live).await;
    assert_eq!(opening, json!({ "role": "doctor", "badges": {} }));

    let request_id = open_request(&h).await;
    let (_, requested) = next_event(&mut live).await;
    assert_eq!(requested["snapshot"]["badges"][&h.patient.id], "pending");

    let uri = format!("/requests/{}/approve", request_id);
    h.app.clone().oneshot(request("POST", &uri, &h.patient_token, None)).await.unwrap();

    let (_, approved) = next_event(&mut live).await;
    assert_eq!(approved["snapshot"]["badges"][&h.patient.id], "view_records");
}
