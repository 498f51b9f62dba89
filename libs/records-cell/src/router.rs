use axum::{
    middleware,
    routing::{delete, get, patch},
    Router,
};

use shared_models::auth::Role;
use shared_utils::extractor::{auth_middleware, require_role};

use crate::handlers::*;
use crate::models::{Appointment, HealthMetric, Medication, Report};

pub fn create_records_router(state: RecordsState) -> Router {
    let patient_routes = Router::new()
        .route("/appointments", get(list_records::<Appointment>).post(create_record::<Appointment>))
        .route("/appointments/{id}", delete(delete_record::<Appointment>))
        .route("/reports", get(list_records::<Report>).post(create_record::<Report>))
        .route("/reports/{id}", delete(delete_record::<Report>))
        .route("/metrics", get(list_records::<HealthMetric>).post(create_record::<HealthMetric>))
        .route("/metrics/summary", get(metrics_summary))
        .route("/metrics/{id}", delete(delete_record::<HealthMetric>))
        .route("/medications", get(list_records::<Medication>).post(create_record::<Medication>))
        .route("/medications/{id}", delete(delete_record::<Medication>))
        .route_layer(middleware::from_fn_with_state(Role::Patient, require_role));

    let doctor_routes = Router::new()
        .route("/doctor/appointments", get(doctor_appointments))
        .route("/doctor/appointments/{id}/status", patch(update_appointment_status))
        .route_layer(middleware::from_fn_with_state(Role::Doctor, require_role));

    Router::new()
        .merge(patient_routes)
        .merge(doctor_routes)
        .layer(middleware::from_fn_with_state(state.ctx.config.clone(), auth_middleware))
        .with_state(state)
}
