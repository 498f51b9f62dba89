use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            redis_url: None,
            reminder_interval_secs: 3600,
            port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some("authenticated".to_string()),
            metadata: Some(json!({ "role": self.role })),
            created_at: Some(Utc::now()),
        }
    }

    pub fn portal_role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    /// Signs a Supabase-shaped token: `role` is `authenticated`, the portal
    /// role sits in `user_metadata`.
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let claims = Self::claims(user, exp_hours.unwrap_or(24), json!({ "role": user.role }));
        Self::sign(&claims, secret)
    }

    /// A valid session for an account whose metadata carries no role.
    pub fn create_token_without_role(user: &TestUser, secret: &str) -> String {
        Self::sign(&Self::claims(user, 24, json!({})), secret)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }

    fn claims(user: &TestUser, exp_hours: i64, metadata: serde_json::Value) -> serde_json::Value {
        let now = Utc::now();
        json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "aud": "authenticated",
            "user_metadata": metadata,
            "iat": now.timestamp(),
            "exp": (now + Duration::hours(exp_hours)).timestamp()
        })
    }

    fn sign(claims: &serde_json::Value, secret: &str) -> String {
        let encode = |value: &serde_json::Value| general_purpose::URL_SAFE_NO_PAD.encode(value.to_string());
        let signing_input = format!(
            "{}.{}",
            encode(&json!({ "alg": "HS256", "typ": "JWT" })),
            encode(claims)
        );

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(signing_input.as_bytes());
        let signature = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", signing_input, signature)
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn auth_user_response(user: &TestUser) -> serde_json::Value {
        json!({
            "id": user.id,
            "email": user.email,
            "role": "authenticated",
            "user_metadata": { "role": user.role },
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn session_response(user: &TestUser, access_token: &str) -> serde_json::Value {
        json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh-token",
            "user": Self::auth_user_response(user)
        })
    }

    pub fn patient_row(user_id: &str, name: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "user_id": user_id,
            "name": name,
            "date_of_birth": "1990-01-01",
            "condition": null
        })
    }

    pub fn doctor_row(user_id: &str, name: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "user_id": user_id,
            "name": name,
            "specialization": "General Practice",
            "experience_years": 10,
            "qualifications": ["MBBS", "MRCGP"]
        })
    }
}
