use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AuthState};
use crate::services::AuthService;

pub fn auth_routes(config: Arc<AppConfig>, service: Arc<AuthService>) -> Router {
    let public_routes = Router::new()
        .route("/sign-in", post(handlers::sign_in))
        .route("/sign-up", post(handlers::sign_up))
        .route("/validate", post(handlers::validate_token));

    let protected_routes = Router::new()
        .route("/sign-out", post(handlers::sign_out))
        .route("/me", get(handlers::get_me).put(handlers::update_me))
        .layer(middleware::from_fn_with_state(config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(AuthState { config, service })
}
