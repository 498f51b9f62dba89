use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
    body::Body,
};
use tracing::debug;

use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_config::AppConfig;

use crate::jwt::validate_token;

/// Caller identity with the role already resolved.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user: User,
    pub role: Role,
    pub token: String,
}

impl Actor {
    pub fn id(&self) -> &str {
        &self.user.id
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Ok(actor.clone());
        }
        if parts.extensions.get::<User>().is_some() {
            return Err(AppError::Forbidden("No portal role assigned to this account".to_string()));
        }
        Err(AppError::Auth("Sign in to continue".to_string()))
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_value = headers
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    auth_value
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))
}

// Validates the session token and stores the `User` in request extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;

    let user = validate_token(&token, &config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    if let Some(role) = user.portal_role() {
        request.extensions_mut().insert(Actor {
            user: user.clone(),
            role,
            token,
        });
    }
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Route guard: the caller must hold `required`. Layer it after
/// `auth_middleware`.
pub async fn require_role(
    State(required): State<Role>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let actor = request
        .extensions()
        .get::<Actor>()
        .ok_or_else(|| AppError::Forbidden("No portal role assigned to this account".to_string()))?;

    match (required, actor.role) {
        (Role::Patient, Role::Patient) | (Role::Doctor, Role::Doctor) => {
            Ok(next.run(request).await)
        }
        (Role::Patient, Role::Doctor) | (Role::Doctor, Role::Patient) => {
            debug!("Role {} denied on {} route", actor.role, required);
            Err(AppError::Forbidden(format!(
                "This area is for {}s; continue at {}",
                required,
                actor.role.home_route()
            )))
        }
    }
}
