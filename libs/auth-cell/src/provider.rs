use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_models::auth::{Session, User};

use crate::models::AuthError;

/// Account created by `sign_up`. `session` is absent when the provider
/// holds the account until the e-mail address is confirmed.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    pub session: Option<Session>,
}

/// Hosted identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<Registration, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;

    async fn get_user(&self, access_token: &str) -> Result<User, AuthError>;

    /// Merges `metadata` into the user's `user_metadata`.
    async fn update_user(&self, access_token: &str, metadata: Value) -> Result<User, AuthError>;
}

/// Supabase GoTrue client (`/auth/v1`).
pub struct SupabaseAuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseAuthClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, access_token: Option<&str>) -> Result<HeaderMap, AuthError> {
        let mut headers = HeaderMap::new();
        let invalid = |e: reqwest::header::InvalidHeaderValue| AuthError::MalformedInput(e.to_string());

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key).map_err(invalid)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = access_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).map_err(invalid)?,
            );
        }

        Ok(headers)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        access_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value, AuthError> {
        let url = format!("{}/auth/v1{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut req = self
            .client
            .request(method, &url)
            .headers(self.get_headers(access_token)?);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await.map_err(|e| {
            error!("Identity provider request failed: {}", e);
            AuthError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            error!("Identity provider error ({}): {}", status, text);
            return Err(classify_error(status, path, &text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }
}

/// Maps a GoTrue error body to an `AuthError`. GoTrue reports the message
/// under `msg`, `error_description` or `message` depending on endpoint.
fn classify_error(status: StatusCode, path: &str, body: &str) -> AuthError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let message = ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|key| parsed.get(*key).and_then(Value::as_str))
        .unwrap_or(body)
        .to_string();

    match status {
        StatusCode::BAD_REQUEST if path.starts_with("/token") => AuthError::InvalidCredentials,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AuthError::Unauthorized,
        s if s.is_server_error() => AuthError::Unavailable(message),
        s => AuthError::Rejected { status: s.as_u16(), message },
    }
}

fn parse<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, AuthError> {
    serde_json::from_value(value).map_err(|e| AuthError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let body = json!({ "email": email, "password": password });
        let value = self
            .request(Method::POST, "/token?grant_type=password", None, Some(body))
            .await?;
        parse(value)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<Registration, AuthError> {
        let body = json!({ "email": email, "password": password, "data": metadata });
        let value = self.request(Method::POST, "/signup", None, Some(body)).await?;

        // With auto-confirm GoTrue answers with a session, otherwise with the
        // bare user.
        if value.get("access_token").is_some() {
            let session: Session = parse(value)?;
            Ok(Registration { user: session.user.clone(), session: Some(session) })
        } else {
            Ok(Registration { user: parse(value)?, session: None })
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        self.request(Method::POST, "/logout", Some(access_token), None).await?;
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<User, AuthError> {
        let value = self.request(Method::GET, "/user", Some(access_token), None).await?;
        parse(value)
    }

    async fn update_user(&self, access_token: &str, metadata: Value) -> Result<User, AuthError> {
        let body = json!({ "data": metadata });
        let value = self.request(Method::PUT, "/user", Some(access_token), Some(body)).await?;
        parse(value)
    }
}
