use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use shared_database::PortalContext;
use shared_models::error::AppError;
use shared_utils::extractor::Actor;

use crate::models::{Appointment, HealthMetric, Medication, Report, StatusUpdate};
use crate::services::{DoctorAppointmentService, Entity, HealthSummary, ReconcilingRepository};

/// Repositories are built once so the pending set outlives single requests.
#[derive(Clone)]
pub struct RecordsState {
    pub ctx: PortalContext,
    pub appointments: Arc<ReconcilingRepository<Appointment>>,
    pub reports: Arc<ReconcilingRepository<Report>>,
    pub metrics: Arc<ReconcilingRepository<HealthMetric>>,
    pub medications: Arc<ReconcilingRepository<Medication>>,
    pub doctor: Arc<DoctorAppointmentService>,
}

impl RecordsState {
    pub fn new(ctx: PortalContext) -> Self {
        let (store, cache) = (ctx.store.clone(), ctx.cache.clone());
        Self {
            appointments: Arc::new(ReconcilingRepository::new(store.clone(), cache.clone())),
            reports: Arc::new(ReconcilingRepository::new(store.clone(), cache.clone())),
            metrics: Arc::new(ReconcilingRepository::new(store.clone(), cache.clone())),
            medications: Arc::new(ReconcilingRepository::new(store, cache)),
            doctor: Arc::new(DoctorAppointmentService::new(ctx.store.clone())),
            ctx,
        }
    }
}

pub trait RepositoryFor<E: Entity> {
    fn repository(&self) -> &ReconcilingRepository<E>;
}

macro_rules! repository_for {
    ($entity:ty, $field:ident) => {
        impl RepositoryFor<$entity> for RecordsState {
            fn repository(&self) -> &ReconcilingRepository<$entity> {
                &self.$field
            }
        }
    };
}

repository_for!(Appointment, appointments);
repository_for!(Report, reports);
repository_for!(HealthMetric, metrics);
repository_for!(Medication, medications);

pub async fn list_records<E>(
    State(state): State<RecordsState>,
    actor: Actor,
) -> Json<Vec<E>>
where
    E: Entity,
    RecordsState: RepositoryFor<E>,
{
    let records = RepositoryFor::<E>::repository(&state).fetch(actor.id(), Some(&actor.token)).await;
    Json(records)
}

pub async fn create_record<E>(
    State(state): State<RecordsState>,
    actor: Actor,
    Json(draft): Json<E::Draft>,
) -> Result<(StatusCode, Json<E>), AppError>
where
    E: Entity,
    RecordsState: RepositoryFor<E>,
{
    let record = E::from_draft(draft)?;
    let created = RepositoryFor::<E>::repository(&state).create(actor.id(), record, Some(&actor.token)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete_record<E>(
    State(state): State<RecordsState>,
    actor: Actor,
    Path(id): Path<String>,
) -> StatusCode
where
    E: Entity,
    RecordsState: RepositoryFor<E>,
{
    RepositoryFor::<E>::repository(&state).delete(actor.id(), &id, Some(&actor.token)).await;
    StatusCode::NO_CONTENT
}

#[axum::debug_handler]
pub async fn metrics_summary(
    State(state): State<RecordsState>,
    actor: Actor,
) -> Json<HealthSummary> {
    let metrics = state.metrics.fetch(actor.id(), Some(&actor.token)).await;
    Json(HealthSummary::from_metrics(&metrics))
}

#[axum::debug_handler]
pub async fn doctor_appointments(
    State(state): State<RecordsState>,
    actor: Actor,
) -> Result<Json<Value>, AppError> {
    let token = Some(actor.token.as_str());
    let name = state.doctor.doctor_name(actor.id(), actor.user.display_name(), token).await;

    let appointments = state.doctor.board(actor.id(), name.as_deref(), token).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<RecordsState>,
    actor: Actor,
    Path(appointment_id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Appointment>, AppError> {
    let token = Some(actor.token.as_str());
    let name = state.doctor.doctor_name(actor.id(), actor.user.display_name(), token).await;

    let appointment = state
        .doctor
        .update_status(actor.id(), name.as_deref(), &appointment_id, update.status, token)
        .await?;

    Ok(Json(appointment))
}
