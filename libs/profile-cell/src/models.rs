use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const PATIENTS_TABLE: &str = "patients";
pub const DOCTORS_TABLE: &str = "doctors";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientProfile {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorProfile {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub specialization: String,
    #[serde(default)]
    pub experience_years: Option<u32>,
    #[serde(default)]
    pub qualifications: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePatientProfileRequest {
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub condition: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDoctorProfileRequest {
    pub name: String,
    pub specialization: String,
    pub experience_years: Option<u32>,
    #[serde(default)]
    pub qualifications: Vec<String>,
}
