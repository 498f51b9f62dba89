use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, instrument};

use profile_cell::ProfileService;
use shared_database::{Query, RecordStore, StoreError};

use crate::models::{Appointment, AppointmentStatus, DoctorAppointment, RecordsError};
use crate::services::repository::Entity;

/// Appointments seen from the doctor's side.
pub struct DoctorAppointmentService {
    store: Arc<dyn RecordStore>,
    profiles: ProfileService,
}

impl DoctorAppointmentService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            profiles: ProfileService::new(store.clone()),
            store,
        }
    }

    /// Name the doctor is booked under: the doctor profile, else the display
    /// name carried by the session.
    pub async fn doctor_name(
        &self,
        doctor_id: &str,
        session_name: Option<String>,
        auth_token: Option<&str>,
    ) -> Option<String> {
        match self.profiles.doctor_display_name(doctor_id, auth_token).await {
            Some(name) => Some(name),
            None => session_name,
        }
    }

    /// Appointments associated with the doctor (by id, or by name when the
    /// booking predates doctor ids), restricted to registered patients.
    #[instrument(skip(self, auth_token))]
    pub async fn board(
        &self,
        doctor_id: &str,
        doctor_name: Option<&str>,
        auth_token: Option<&str>,
    ) -> Result<Vec<DoctorAppointment>, RecordsError> {
        let rows = self
            .store
            .select(Appointment::TABLE, &Query::new().order(Appointment::natural_order()), auth_token)
            .await?;

        let patients: HashMap<String, String> = self
            .profiles
            .list_patients(auth_token)
            .await
            .map_err(|e| match e.downcast::<StoreError>() {
                Ok(store_error) => RecordsError::Store(store_error),
                Err(other) => RecordsError::Store(StoreError::Request(other.to_string())),
            })?
            .into_iter()
            .map(|p| (p.user_id, p.name))
            .collect();

        let board: Vec<DoctorAppointment> = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value::<Appointment>(row).ok())
            .filter(|a| is_associated(a, doctor_id, doctor_name))
            .filter_map(|appointment| {
                patients.get(&appointment.user_id).map(|name| DoctorAppointment {
                    patient_name: name.clone(),
                    appointment,
                })
            })
            .collect();

        debug!("{} appointments on board for doctor {}", board.len(), doctor_id);
        Ok(board)
    }

    /// Completes or cancels a scheduled appointment. The write is guarded on
    /// the row still being scheduled.
    #[instrument(skip(self, auth_token))]
    pub async fn update_status(
        &self,
        doctor_id: &str,
        doctor_name: Option<&str>,
        appointment_id: &str,
        next: AppointmentStatus,
        auth_token: Option<&str>,
    ) -> Result<Appointment, RecordsError> {
        let rows = self
            .store
            .select(Appointment::TABLE, &Query::new().eq("id", appointment_id).limit(1), auth_token)
            .await?;
        let current: Appointment = match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row)?,
            None => return Err(RecordsError::NotFound),
        };

        if !is_associated(&current, doctor_id, doctor_name) {
            return Err(RecordsError::Forbidden(
                "Appointment is not booked with this doctor".to_string(),
            ));
        }
        if !current.status.can_transition_to(next) {
            return Err(RecordsError::InvalidTransition {
                from: current.status.as_str(),
                to: next.as_str(),
            });
        }

        let guard = Query::new()
            .eq("id", appointment_id)
            .eq("status", AppointmentStatus::Scheduled.as_str());
        let updated = self
            .store
            .update(Appointment::TABLE, &guard, json!({ "status": next }), auth_token)
            .await?;

        match updated.into_iter().next() {
            Some(row) => {
                info!("Appointment {} marked {}", appointment_id, next.as_str());
                Ok(serde_json::from_value(row)?)
            }
            // Someone else moved it first.
            None => Err(RecordsError::InvalidTransition {
                from: "changed",
                to: next.as_str(),
            }),
        }
    }
}

fn is_associated(appointment: &Appointment, doctor_id: &str, doctor_name: Option<&str>) -> bool {
    if appointment.doctor_id.as_deref() == Some(doctor_id) {
        return true;
    }
    match doctor_name {
        Some(name) if !name.trim().is_empty() => {
            appointment.doctor_name.trim().eq_ignore_ascii_case(name.trim())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::Value;
    use shared_database::InMemoryRecordStore;

    async fn seeded() -> (DoctorAppointmentService, Arc<InMemoryRecordStore>) {
        let store = Arc::new(InMemoryRecordStore::default());
        store.insert("patients", json!({ "id": "pp1", "user_id": "p1", "name": "Pat One" }), None).await.unwrap();

        let appointments: [Value; 4] = [
            json!({ "id": "a1", "user_id": "p1", "doctor_id": "d1", "doctor_name": "Dr. Grey", "date": "2024-05-02", "time": "09:00", "status": "scheduled" }),
            json!({ "id": "a2", "user_id": "p1", "doctor_name": "dr. grey", "date": "2024-05-01", "time": "10:00", "status": "scheduled" }),
            json!({ "id": "a3", "user_id": "ghost", "doctor_id": "d1", "doctor_name": "Dr. Grey", "date": "2024-05-03", "time": "11:00" }),
            json!({ "id": "a4", "user_id": "p1", "doctor_id": "d2", "doctor_name": "Dr. Other", "date": "2024-05-04", "time": "12:00" }),
        ];
        for row in appointments {
            store.insert("appointments", row, None).await.unwrap();
        }

        (DoctorAppointmentService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_board_matches_by_id_or_name_for_real_patients() {
        let (service, _) = seeded().await;
        let board = service.board("d1", Some("Dr. Grey"), None).await.unwrap();

        let ids: Vec<&str> = board.iter().map(|a| a.appointment.id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a1"]);
        assert!(board.iter().all(|a| a.patient_name == "Pat One"));
    }

    #[tokio::test]
    async fn test_status_transitions_are_enforced() {
        let (service, _) = seeded().await;

        let done = service
            .update_status("d1", None, "a1", AppointmentStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);

        assert_matches!(
            service.update_status("d1", None, "a1", AppointmentStatus::Cancelled, None).await,
            Err(RecordsError::InvalidTransition { .. })
        );
        assert_matches!(
            service.update_status("d1", None, "a4", AppointmentStatus::Cancelled, None).await,
            Err(RecordsError::Forbidden(_))
        );
        assert_matches!(
            service.update_status("d1", None, "missing", AppointmentStatus::Cancelled, None).await,
            Err(RecordsError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_board_surfaces_store_outage() {
        let (service, store) = seeded().await;
        store.set_available(false);
        assert_matches!(service.board("d1", None, None).await, Err(RecordsError::Store(_)));
    }
}
