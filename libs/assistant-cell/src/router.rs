use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_models::auth::Role;
use shared_utils::extractor::{auth_middleware, require_role};

use crate::handlers::{analyze_report, save_analysis, saved_analyses, send_message, AssistantState};

pub fn create_assistant_router(state: AssistantState) -> Router {
    let config = state.ctx.config.clone();

    Router::new()
        .route("/messages", post(send_message))
        .route("/report-analysis", post(analyze_report))
        .route("/report-analysis/saved", get(saved_analyses).post(save_analysis))
        .route_layer(middleware::from_fn_with_state(Role::Patient, require_role))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
