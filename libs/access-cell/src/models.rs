use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use profile_cell::PatientProfile;
use records_cell::Report;
use shared_database::StoreError;
use shared_models::error::AppError;

pub const ACCESS_REQUESTS_TABLE: &str = "access_requests";

/// What a doctor asks to see. Stored as `request_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessScope {
    Profile,
    Reports,
    All,
}

/// The class of patient data a visibility check is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    Profile,
    Reports,
}

impl AccessScope {
    pub fn covers(&self, class: ResourceClass) -> bool {
        match (self, class) {
            (AccessScope::All, _) => true,
            (AccessScope::Profile, ResourceClass::Profile) => true,
            (AccessScope::Reports, ResourceClass::Reports) => true,
            (AccessScope::Profile, ResourceClass::Reports)
            | (AccessScope::Reports, ResourceClass::Profile) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessStatus {
    Pending,
    Approved,
    Rejected,
}

impl AccessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessStatus::Pending => "pending",
            AccessStatus::Approved => "approved",
            AccessStatus::Rejected => "rejected",
        }
    }
}

/// One row of `access_requests`. `doctor_id` and `patient_id` are identity
/// ids; older rows for a pair stay as history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessRequest {
    pub id: String,
    pub doctor_id: String,
    pub patient_id: String,
    pub request_type: AccessScope,
    pub status: AccessStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl AccessRequest {
    pub fn is_for_pair(&self, doctor_id: &str, patient_id: &str) -> bool {
        self.doctor_id == doctor_id && self.patient_id == patient_id
    }

    pub fn grants(&self, class: ResourceClass) -> bool {
        self.status == AccessStatus::Approved && self.request_type.covers(class)
    }
}

/// Doctor-facing state of a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessBadge {
    RequestAccess,
    Pending,
    ViewRecords,
}

#[derive(Debug, Deserialize)]
pub struct RequestAccessBody {
    pub patient_id: String,
    #[serde(default = "default_scope")]
    pub request_type: AccessScope,
}

fn default_scope() -> AccessScope {
    AccessScope::All
}

#[derive(Debug, Deserialize)]
pub struct VisibilityQuery {
    pub resource: ResourceClass,
}

/// A pending request as the patient sees it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PendingRequest {
    pub id: String,
    pub doctor_id: String,
    pub doctor_name: String,
    pub request_type: AccessScope,
    pub created_at: Option<DateTime<Utc>>,
}

pub const UNKNOWN_DOCTOR: &str = "Unknown Doctor";

/// Derived access state pushed to a live client after every change.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum LiveSnapshot {
    Doctor { badges: BTreeMap<String, AccessBadge> },
    Patient { pending: Vec<AccessRequest> },
}

/// One patient on the doctor's board.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PatientCard {
    pub patient_id: String,
    pub name: String,
    pub condition: Option<String>,
    pub badge: AccessBadge,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<AccessScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent_reports: Vec<String>,
}

/// What an approved doctor may read about one patient.
#[derive(Debug, Clone, Serialize)]
pub struct PatientRecords {
    pub patient_id: String,
    pub scope: AccessScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<PatientProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports: Option<Vec<Report>>,
}

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("A request for this patient is already pending")]
    DuplicatePendingRequest,

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Access request not found")]
    NotFound,

    #[error("{0}")]
    MalformedInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::DuplicatePendingRequest => AppError::Conflict(err.to_string()),
            AccessError::InvalidState(msg) => AppError::InvalidState(msg),
            AccessError::Forbidden(msg) => AppError::Forbidden(msg),
            AccessError::NotFound => AppError::NotFound(err.to_string()),
            AccessError::MalformedInput(msg) => AppError::ValidationError(msg),
            AccessError::Store(e) => AppError::ExternalService(e.to_string()),
            AccessError::Serialization(e) => AppError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_scope_coverage() {
        assert!(AccessScope::All.covers(ResourceClass::Profile));
        assert!(AccessScope::All.covers(ResourceClass::Reports));
        assert!(AccessScope::Reports.covers(ResourceClass::Reports));
        assert!(!AccessScope::Reports.covers(ResourceClass::Profile));
        assert!(!AccessScope::Profile.covers(ResourceClass::Reports));
    }

    #[test]
    fn test_request_row_decodes() {
        let row = json!({
            "id": "r1",
            "doctor_id": "d1",
            "patient_id": "p1",
            "request_type": "reports",
            "status": "approved",
            "created_at": "2024-03-01T10:00:00.123456+00:00"
        });
        let request: AccessRequest = serde_json::from_value(row).unwrap();
        assert!(request.grants(ResourceClass::Reports));
        assert!(!request.grants(ResourceClass::Profile));
        assert!(request.created_at.is_some());
    }

    #[test]
    fn test_error_status_codes() {
        let duplicate: AppError = AccessError::DuplicatePendingRequest.into();
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);

        let malformed: AppError = AccessError::MalformedInput("Patient is required".into()).into();
        assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);

        let offline: AppError = AccessError::Store(StoreError::Network("down".into())).into();
        assert_eq!(offline.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
