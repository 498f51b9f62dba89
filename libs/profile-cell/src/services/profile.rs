use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_database::{Order, Query, RecordStore};
use shared_models::auth::Role;

use crate::models::{
    DoctorProfile, PatientProfile, UpdateDoctorProfileRequest, UpdatePatientProfileRequest,
    DOCTORS_TABLE, PATIENTS_TABLE,
};

pub struct ProfileService {
    store: Arc<dyn RecordStore>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn patient_profile(
        &self,
        user_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Option<PatientProfile>> {
        debug!("Fetching patient profile for user: {}", user_id);
        self.first_by_user(PATIENTS_TABLE, user_id, auth_token).await
    }

    pub async fn doctor_profile(
        &self,
        user_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Option<DoctorProfile>> {
        debug!("Fetching doctor profile for user: {}", user_id);
        self.first_by_user(DOCTORS_TABLE, user_id, auth_token).await
    }

    /// Creates or replaces the caller's patient row, keyed on `user_id`.
    pub async fn save_patient_profile(
        &self,
        user_id: &str,
        request: UpdatePatientProfileRequest,
        auth_token: Option<&str>,
    ) -> Result<PatientProfile> {
        let row = json!({
            "user_id": user_id,
            "name": request.name.trim(),
            "date_of_birth": request.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
            "condition": request.condition.filter(|c| !c.trim().is_empty()),
        });

        let saved = self.store.upsert(PATIENTS_TABLE, row, "user_id", auth_token).await?;
        info!("Patient profile saved for user {}", user_id);
        Ok(serde_json::from_value(saved)?)
    }

    pub async fn save_doctor_profile(
        &self,
        user_id: &str,
        request: UpdateDoctorProfileRequest,
        auth_token: Option<&str>,
    ) -> Result<DoctorProfile> {
        let qualifications: Vec<String> = request
            .qualifications
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();

        let row = json!({
            "user_id": user_id,
            "name": request.name.trim(),
            "specialization": request.specialization.trim(),
            "experience_years": request.experience_years,
            "qualifications": qualifications,
        });

        let saved = self.store.upsert(DOCTORS_TABLE, row, "user_id", auth_token).await?;
        info!("Doctor profile saved for user {}", user_id);
        Ok(serde_json::from_value(saved)?)
    }

    /// Every registered patient, by name.
    pub async fn list_patients(&self, auth_token: Option<&str>) -> Result<Vec<PatientProfile>> {
        let rows = self
            .store
            .select(PATIENTS_TABLE, &Query::new().order(Order::asc("name")), auth_token)
            .await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| anyhow!("Invalid patient row: {}", e)))
            .collect()
    }

    /// Display name of the doctor behind an identity ref. Lookup failures are
    /// logged and read as "unknown".
    pub async fn doctor_display_name(
        &self,
        doctor_user_id: &str,
        auth_token: Option<&str>,
    ) -> Option<String> {
        match self.doctor_profile(doctor_user_id, auth_token).await {
            Ok(profile) => profile.map(|p| p.name).filter(|name| !name.trim().is_empty()),
            Err(e) => {
                warn!("Doctor lookup failed for {}: {}", doctor_user_id, e);
                None
            }
        }
    }

    /// Role implied by which profile table holds a row for the user. Doctors
    /// are checked first.
    pub async fn registered_role(
        &self,
        user_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Option<Role>> {
        if self.doctor_profile(user_id, auth_token).await?.is_some() {
            return Ok(Some(Role::Doctor));
        }
        if self.patient_profile(user_id, auth_token).await?.is_some() {
            return Ok(Some(Role::Patient));
        }
        Ok(None)
    }

    /// Inserts the profile row that accompanies a new account. Best effort:
    /// a failure is logged and the account stays usable.
    pub async fn create_initial_profile(
        &self,
        role: Role,
        user_id: &str,
        name: &str,
        specialization: Option<&str>,
        auth_token: Option<&str>,
    ) -> bool {
        let (table, row) = match role {
            Role::Patient => (PATIENTS_TABLE, json!({ "user_id": user_id, "name": name })),
            Role::Doctor => (
                DOCTORS_TABLE,
                json!({
                    "user_id": user_id,
                    "name": name,
                    "specialization": specialization.unwrap_or_default(),
                    "qualifications": [],
                }),
            ),
        };

        match self.store.insert(table, row, auth_token).await {
            Ok(_) => {
                info!("Created {} profile row for user {}", role, user_id);
                true
            }
            Err(e) => {
                warn!("Could not create {} profile row for {}: {}", role, user_id, e);
                false
            }
        }
    }

    async fn first_by_user<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        user_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Option<T>> {
        let query = Query::new().eq("user_id", user_id).limit(1);
        let rows: Vec<Value> = self.store.select(table, &query, auth_token).await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }
}
