use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_database::PortalContext;
use shared_models::auth::Role;
use shared_utils::extractor::{auth_middleware, require_role};

use crate::handlers::*;

pub fn create_access_router(ctx: PortalContext) -> Router {
    let doctor_routes = Router::new()
        .route("/requests", post(request_access))
        .route("/visibility/{patient_id}", get(check_visibility))
        .route("/board", get(doctor_board))
        .route("/patients/{patient_id}/records", get(patient_records))
        .route_layer(middleware::from_fn_with_state(Role::Doctor, require_role));

    let patient_routes = Router::new()
        .route("/requests/pending", get(pending_requests))
        .route("/requests/{id}/approve", post(approve_request))
        .route("/requests/{id}/reject", post(reject_request))
        .route_layer(middleware::from_fn_with_state(Role::Patient, require_role));

    Router::new()
        .merge(doctor_routes)
        .merge(patient_routes)
        .route("/live", get(live_updates))
        .layer(middleware::from_fn_with_state(ctx.config.clone(), auth_middleware))
        .with_state(ctx)
}
