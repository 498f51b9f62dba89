use axum::{extract::State, Json};
use serde_json::{json, Value};

use shared_database::PortalContext;
use shared_models::error::AppError;
use shared_utils::extractor::Actor;
use shared_utils::validation::validate_name;

use crate::models::{UpdateDoctorProfileRequest, UpdatePatientProfileRequest};
use crate::services::ProfileService;

fn store_error(e: anyhow::Error) -> AppError {
    AppError::ExternalService(e.to_string())
}

#[axum::debug_handler]
pub async fn get_patient_profile(
    State(ctx): State<PortalContext>,
    actor: Actor,
) -> Result<Json<Value>, AppError> {
    let service = ProfileService::new(ctx.store.clone());

    let profile = service.patient_profile(actor.id(), Some(&actor.token))
        .await
        .map_err(store_error)?
        .ok_or_else(|| AppError::NotFound("Patient profile not found".to_string()))?;

    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn update_patient_profile(
    State(ctx): State<PortalContext>,
    actor: Actor,
    Json(request): Json<UpdatePatientProfileRequest>,
) -> Result<Json<Value>, AppError> {
    validate_name("Name", &request.name)?;
    let service = ProfileService::new(ctx.store.clone());

    let profile = service.save_patient_profile(actor.id(), request, Some(&actor.token))
        .await
        .map_err(store_error)?;

    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn get_doctor_profile(
    State(ctx): State<PortalContext>,
    actor: Actor,
) -> Result<Json<Value>, AppError> {
    let service = ProfileService::new(ctx.store.clone());

    let profile = service.doctor_profile(actor.id(), Some(&actor.token))
        .await
        .map_err(store_error)?
        .ok_or_else(|| AppError::NotFound("Doctor profile not found".to_string()))?;

    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn update_doctor_profile(
    State(ctx): State<PortalContext>,
    actor: Actor,
    Json(request): Json<UpdateDoctorProfileRequest>,
) -> Result<Json<Value>, AppError> {
    validate_name("Name", &request.name)?;
    validate_name("Specialization", &request.specialization)?;
    let service = ProfileService::new(ctx.store.clone());

    let profile = service.save_doctor_profile(actor.id(), request, Some(&actor.token))
        .await
        .map_err(store_error)?;

    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn list_patients(
    State(ctx): State<PortalContext>,
    actor: Actor,
) -> Result<Json<Value>, AppError> {
    let service = ProfileService::new(ctx.store.clone());

    let patients = service.list_patients(Some(&actor.token))
        .await
        .map_err(store_error)?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}
