use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use assistant_cell::{create_assistant_router, AssistantState};
use shared_database::PortalContext;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn app() -> (Router, TestConfig) {
    let config = TestConfig::default();
    let (ctx, _) = PortalContext::in_memory(config.to_arc());
    (create_assistant_router(AssistantState::new(ctx)), config)
}

fn patient_token(config: &TestConfig) -> String {
    JwtTestUtils::create_test_token(&TestUser::patient("p@example.com"), &config.jwt_secret, None)
}

fn post(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn message(token: &str, text: &str) -> Request<Body> {
    post("/messages", token, json!({ "message": text }))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_patient_gets_scripted_reply() {
    let (app, config) = app();
    let token = patient_token(&config);

    let response = app.oneshot(message(&token, "Any medicine for allergies?")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["topic"], "medication");
    assert_eq!(body["disclaimer"], true);
    assert!(body["reply"].as_str().unwrap().contains("loratadine"));
}

#[tokio::test]
async fn test_blank_message_is_rejected() {
    let (app, config) = app();
    let token = patient_token(&config);

    let response = app.oneshot(message(&token, "   ")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_doctors_are_redirected() {
    let (app, config) = app();
    let token = JwtTestUtils::create_test_token(&TestUser::doctor("d@example.com"), &config.jwt_secret, None);

    let response = app.clone().oneshot(message(&token, "help")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let analysis = app
        .oneshot(post("/report-analysis", &token, json!({ "file_name": "cbc.pdf" })))
        .await
        .unwrap();
    assert_eq!(analysis.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_report_analysis_follows_file_name() {
    let (app, config) = app();
    let token = patient_token(&config);

    let response = app
        .clone()
        .oneshot(post("/report-analysis", &token, json!({ "file_name": "Chest_XRay_Feb.jpg" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "chest_imaging");
    assert_eq!(body["findings"].as_array().unwrap().len(), 4);

    let unsupported = app
        .oneshot(post("/report-analysis", &token, json!({ "file_name": "notes.docx" })))
        .await
        .unwrap();
    assert_eq!(unsupported.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_saved_analyses_round_trip_through_the_store() {
    let (app, config) = app();
    let token = patient_token(&config);

    let saved = app
        .clone()
        .oneshot(post("/report-analysis/saved", &token, json!({ "file_name": "blood_test.pdf" })))
        .await
        .unwrap();
    assert_eq!(saved.status(), StatusCode::CREATED);
    let saved = json_body(saved).await;
    assert_eq!(saved["result"]["kind"], "blood_work");

    let list = json_body(
        app.oneshot(
            Request::builder()
                .uri("/report-analysis/saved")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap(),
    )
    .await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["analyses"][0]["id"], saved["id"]);
    assert_eq!(list["analyses"][0]["file_name"], "blood_test.pdf");
}
