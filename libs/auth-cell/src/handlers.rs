use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::TokenResponse;
use shared_models::error::AppError;
use shared_utils::extractor::bearer_token;
use shared_utils::jwt::validate_token as validate_jwt;

use crate::models::{SignInRequest, SignInResponse, SignUpRequest, SignUpResponse, UpdateMetadataRequest};
use crate::services::AuthService;

#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AppConfig>,
    pub service: Arc<AuthService>,
}

#[axum::debug_handler]
pub async fn sign_in(
    State(state): State<AuthState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<SignInResponse>, AppError> {
    let response = state.service.sign_in(request).await?;
    Ok(Json(response))
}

#[axum::debug_handler]
pub async fn sign_up(
    State(state): State<AuthState>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>), AppError> {
    let response = state.service.sign_up(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[axum::debug_handler]
pub async fn sign_out(
    State(state): State<AuthState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    state.service.sign_out(auth.token()).await?;
    Ok(Json(json!({ "signed_out": true })))
}

#[axum::debug_handler]
pub async fn get_me(
    State(state): State<AuthState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let (user, role) = state.service.current_user(auth.token()).await?;

    Ok(Json(json!({
        "user": user,
        "role": role,
        "home_route": role.map(|r| r.home_route()),
    })))
}

#[axum::debug_handler]
pub async fn update_me(
    State(state): State<AuthState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<UpdateMetadataRequest>,
) -> Result<Json<Value>, AppError> {
    let user = state.service.update_metadata(auth.token(), request.data).await?;
    Ok(Json(json!({ "user": user })))
}

pub async fn validate_token(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = bearer_token(&headers)?;
    let user = validate_jwt(&token, &state.config.supabase_jwt_secret).map_err(AppError::Auth)?;

    Ok(Json(TokenResponse {
        valid: true,
        role: user.portal_role(),
        user_id: user.id,
        email: user.email,
    }))
}
