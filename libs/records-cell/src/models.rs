use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_database::{Order, StoreError};
use shared_models::error::AppError;

use crate::services::repository::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Scheduled appointments can be completed or cancelled; both are final.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (AppointmentStatus::Scheduled, AppointmentStatus::Completed)
                | (AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub doctor_id: Option<String>,
    #[serde(alias = "doctor")]
    pub doctor_name: String,
    #[serde(default)]
    pub specialty: String,
    pub date: NaiveDate,
    pub time: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: AppointmentStatus,
    #[serde(default)]
    pub reminder_sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub title: String,
    #[serde(alias = "doctor", default)]
    pub doctor_name: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthMetric {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: String,
    #[serde(alias = "heartRate", default)]
    pub heart_rate: Option<f64>,
    #[serde(default)]
    pub systolic: Option<f64>,
    #[serde(default)]
    pub diastolic: Option<f64>,
    #[serde(alias = "bloodSugar", default)]
    pub blood_sugar: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(alias = "startDate", default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
}

// Request bodies

#[derive(Debug, Deserialize)]
pub struct NewAppointment {
    #[serde(default)]
    pub doctor_id: Option<String>,
    pub doctor_name: String,
    #[serde(default)]
    pub specialty: String,
    pub date: NaiveDate,
    pub time: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewReport {
    pub title: String,
    #[serde(alias = "doctor")]
    pub doctor_name: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewHealthMetric {
    pub date: NaiveDate,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(alias = "heartRate", default)]
    pub heart_rate: Option<f64>,
    #[serde(default)]
    pub systolic: Option<f64>,
    #[serde(default)]
    pub diastolic: Option<f64>,
    #[serde(alias = "bloodSugar", default)]
    pub blood_sugar: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewMedication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    #[serde(alias = "startDate", default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: AppointmentStatus,
}

/// An appointment on a doctor's board, with the patient's display name.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorAppointment {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient_name: String,
}

#[derive(Error, Debug)]
pub enum RecordsError {
    #[error("{0}")]
    Validation(String),

    #[error("Appointment not found")]
    NotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid record: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RecordsError> for AppError {
    fn from(err: RecordsError) -> Self {
        match err {
            RecordsError::Validation(msg) => AppError::ValidationError(msg),
            RecordsError::NotFound => AppError::NotFound(err.to_string()),
            RecordsError::Forbidden(msg) => AppError::Forbidden(msg),
            RecordsError::InvalidTransition { .. } => AppError::InvalidState(err.to_string()),
            RecordsError::Store(e) if e.is_remote_unavailable() => AppError::ExternalService(e.to_string()),
            RecordsError::Store(e) => AppError::Database(e.to_string()),
            RecordsError::Serialization(e) => AppError::Internal(e.to_string()),
        }
    }
}

fn required(field: &str, value: &str) -> Result<String, RecordsError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RecordsError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn clock_time(value: &str) -> Result<String, RecordsError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| RecordsError::Validation(format!("Time must be HH:MM, got '{}'", value)))
}

impl Entity for Appointment {
    type Draft = NewAppointment;

    const TABLE: &'static str = "appointments";
    const CACHE_NAMESPACE: &'static str = "appointments";

    fn natural_order() -> Order {
        Order::asc("date")
    }

    fn from_draft(draft: NewAppointment) -> Result<Self, RecordsError> {
        Ok(Appointment {
            id: String::new(),
            user_id: String::new(),
            doctor_id: draft.doctor_id.filter(|id| !id.trim().is_empty()),
            doctor_name: required("Doctor name", &draft.doctor_name)?,
            specialty: draft.specialty.trim().to_string(),
            date: draft.date,
            time: clock_time(&draft.time)?,
            notes: draft.notes.filter(|n| !n.trim().is_empty()),
            status: AppointmentStatus::Scheduled,
            reminder_sent: false,
            created_at: None,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn assign(&mut self, id: String, owner: &str) {
        self.id = id;
        self.user_id = owner.to_string();
    }
}

impl Entity for Report {
    type Draft = NewReport;

    const TABLE: &'static str = "reports";
    const CACHE_NAMESPACE: &'static str = "reports";

    fn natural_order() -> Order {
        Order::desc("date")
    }

    fn from_draft(draft: NewReport) -> Result<Self, RecordsError> {
        Ok(Report {
            id: String::new(),
            user_id: String::new(),
            title: required("Title", &draft.title)?,
            doctor_name: required("Doctor name", &draft.doctor_name)?,
            date: draft.date,
            category: draft.category.trim().to_string(),
            notes: draft.notes,
            file_url: draft.file_url.filter(|u| !u.is_empty()),
            file_name: draft.file_name.filter(|n| !n.is_empty()),
            created_at: None,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn assign(&mut self, id: String, owner: &str) {
        self.id = id;
        self.user_id = owner.to_string();
    }
}

impl Entity for HealthMetric {
    type Draft = NewHealthMetric;

    const TABLE: &'static str = "health_metrics";
    const CACHE_NAMESPACE: &'static str = "health_metrics";

    fn natural_order() -> Order {
        Order::desc("date")
    }

    fn from_draft(draft: NewHealthMetric) -> Result<Self, RecordsError> {
        let readings = [
            draft.heart_rate,
            draft.systolic,
            draft.diastolic,
            draft.blood_sugar,
            draft.temperature,
        ];
        if readings.iter().all(Option::is_none) {
            return Err(RecordsError::Validation("At least one reading is required".to_string()));
        }
        if readings.iter().flatten().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(RecordsError::Validation("Readings must be non-negative numbers".to_string()));
        }

        let time = match draft.time.as_deref() {
            Some(t) if !t.trim().is_empty() => clock_time(t)?,
            _ => Utc::now().format("%H:%M").to_string(),
        };

        Ok(HealthMetric {
            id: String::new(),
            user_id: String::new(),
            date: draft.date,
            time,
            heart_rate: draft.heart_rate,
            systolic: draft.systolic,
            diastolic: draft.diastolic,
            blood_sugar: draft.blood_sugar,
            temperature: draft.temperature.map(|t| (t * 10.0).round() / 10.0),
            notes: draft.notes.filter(|n| !n.trim().is_empty()),
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn assign(&mut self, id: String, owner: &str) {
        self.id = id;
        self.user_id = owner.to_string();
    }
}

impl Entity for Medication {
    type Draft = NewMedication;

    const TABLE: &'static str = "medications";
    const CACHE_NAMESPACE: &'static str = "medications";

    fn natural_order() -> Order {
        Order::desc("start_date")
    }

    fn from_draft(draft: NewMedication) -> Result<Self, RecordsError> {
        Ok(Medication {
            id: String::new(),
            user_id: String::new(),
            name: required("Name", &draft.name)?,
            dosage: required("Dosage", &draft.dosage)?,
            frequency: required("Frequency", &draft.frequency)?,
            start_date: draft.start_date,
            notes: draft.notes,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn assign(&mut self, id: String, owner: &str) {
        self.id = id;
        self.user_id = owner.to_string();
    }
}
