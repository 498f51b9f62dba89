use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_models::auth::{Role, Session, User};
use shared_models::error::AppError;

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
    /// Portal the caller signed in through. When set, an account holding the
    /// other role is turned away with a pointer to its own home route.
    #[serde(default)]
    pub portal: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    // Patient registration
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    // Doctor registration
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
}

impl SignUpRequest {
    /// Name written to the profile row.
    pub fn display_name(&self) -> String {
        match self.role {
            Role::Patient => format!(
                "{} {}",
                self.first_name.as_deref().unwrap_or("").trim(),
                self.last_name.as_deref().unwrap_or("").trim()
            )
            .trim()
            .to_string(),
            Role::Doctor => self.name.as_deref().unwrap_or("").trim().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub session: Session,
    pub role: Role,
    pub home_route: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub user: User,
    pub session: Option<Session>,
    pub role: Role,
    pub profile_created: bool,
    /// False when the provider requires e-mail confirmation first.
    pub confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMetadataRequest {
    pub data: serde_json::Value,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("{0}")]
    MalformedInput(String),

    #[error("Session is missing or expired")]
    Unauthorized,

    #[error("No portal role could be resolved for this account")]
    NoRole,

    #[error("This account is registered as a {actual}; sign in at {}", .actual.login_route())]
    WrongPortal { expected: Role, actual: Role },

    #[error("Identity provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid identity provider response: {0}")]
    InvalidResponse(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::Unauthorized => AppError::Auth(err.to_string()),
            AuthError::MalformedInput(msg) => AppError::ValidationError(msg),
            AuthError::NoRole | AuthError::WrongPortal { .. } => AppError::Forbidden(err.to_string()),
            AuthError::Rejected { status, message } if status == 409 || status == 422 => {
                AppError::Conflict(message)
            }
            AuthError::Rejected { message, .. } => AppError::BadRequest(message),
            AuthError::Unavailable(msg) | AuthError::InvalidResponse(msg) => {
                AppError::ExternalService(msg)
            }
        }
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        AuthError::MalformedInput(match err {
            AppError::ValidationError(msg) => msg,
            other => other.to_string(),
        })
    }
}
