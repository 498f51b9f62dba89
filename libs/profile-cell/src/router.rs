use axum::{middleware, routing::get, Router};
use shared_database::PortalContext;
use shared_models::auth::Role;
use shared_utils::extractor::{auth_middleware, require_role};

use crate::handlers::*;

pub fn create_profile_router(ctx: PortalContext) -> Router {
    let patient_routes = Router::new()
        .route("/patient", get(get_patient_profile).put(update_patient_profile))
        .route_layer(middleware::from_fn_with_state(Role::Patient, require_role));

    let doctor_routes = Router::new()
        .route("/doctor", get(get_doctor_profile).put(update_doctor_profile))
        .route("/patients", get(list_patients))
        .route_layer(middleware::from_fn_with_state(Role::Doctor, require_role));

    Router::new()
        .merge(patient_routes)
        .merge(doctor_routes)
        .layer(middleware::from_fn_with_state(ctx.config.clone(), auth_middleware))
        .with_state(ctx)
}
