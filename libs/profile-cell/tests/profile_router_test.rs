use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use profile_cell::create_profile_router;
use shared_database::PortalContext;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn setup() -> (Router, TestConfig) {
    let config = TestConfig::default();
    let (ctx, _store) = PortalContext::in_memory(config.to_arc());
    (create_profile_router(ctx), config)
}

fn request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_patient_saves_and_reads_own_profile() {
    let (app, config) = setup();
    let patient = TestUser::patient("jane@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let missing = app.clone().oneshot(request("GET", "/patient", &token, None)).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let saved = app
        .clone()
        .oneshot(request("PUT", "/patient", &token, Some(json!({
            "name": "Jane Doe",
            "date_of_birth": "1990-04-02",
            "condition": "Asthma"
        }))))
        .await
        .unwrap();
    assert_eq!(saved.status(), StatusCode::OK);

    let fetched = app.oneshot(request("GET", "/patient", &token, None)).await.unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let body = json_body(fetched).await;
    assert_eq!(body["name"], "Jane Doe");
    assert_eq!(body["user_id"], patient.id);
}

#[tokio::test]
async fn test_short_name_is_rejected() {
    let (app, config) = setup();
    let token = JwtTestUtils::create_test_token(&TestUser::patient("p@example.com"), &config.jwt_secret, None);

    let response = app
        .oneshot(request("PUT", "/patient", &token, Some(json!({ "name": "J" }))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patient_list_is_doctor_only() {
    let (app, config) = setup();
    let patient_token =
        JwtTestUtils::create_test_token(&TestUser::patient("p@example.com"), &config.jwt_secret, None);
    let doctor_token =
        JwtTestUtils::create_test_token(&TestUser::doctor("d@example.com"), &config.jwt_secret, None);

    app.clone()
        .oneshot(request("PUT", "/patient", &patient_token, Some(json!({ "name": "Pat Jones" }))))
        .await
        .unwrap();

    let denied = app.clone().oneshot(request("GET", "/patients", &patient_token, None)).await.unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let listed = app.oneshot(request("GET", "/patients", &doctor_token, None)).await.unwrap();
    assert_eq!(listed.status(), StatusCode::OK);
    let body = json_body(listed).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["patients"][0]["name"], "Pat Jones");
}

#[tokio::test]
async fn test_doctor_profile_round_trip() {
    let (app, config) = setup();
    let token = JwtTestUtils::create_test_token(&TestUser::doctor("d@example.com"), &config.jwt_secret, None);

    let saved = app
        .clone()
        .oneshot(request("PUT", "/doctor", &token, Some(json!({
            "name": "Dr. Grey",
            "specialization": "Cardiology",
            "experience_years": 12,
            "qualifications": ["MD", " ", "FACC"]
        }))))
        .await
        .unwrap();
    assert_eq!(saved.status(), StatusCode::OK);

    let body = json_body(app.oneshot(request("GET", "/doctor", &token, None)).await.unwrap()).await;
    assert_eq!(body["qualifications"], json!(["MD", "FACC"]));
}
