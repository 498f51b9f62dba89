use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_database::StoreError;
use shared_models::error::AppError;

pub const DISCLAIMER: &str = "Disclaimer: This information is for educational purposes only and \
not a substitute for professional medical advice. Always consult with your healthcare provider \
before taking any medication or making health decisions.";

pub const REPORT_ANALYSES_TABLE: &str = "report_analyses";

/// File types the analysis accepts, matched on the lowercased extension.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Appointments,
    Medication,
    HealthAdvice,
    Nutrition,
    Exercise,
    MentalHealth,
    Reports,
    Help,
    General,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AssistantReply {
    pub topic: Topic,
    pub reply: String,
    pub disclaimer: bool,
}

/// Which script a report was matched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    BloodWork,
    ChestImaging,
    BrainImaging,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportAnalysis {
    pub kind: ReportKind,
    pub diagnosis: String,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeReportRequest {
    pub file_name: String,
}

/// An analysis the patient chose to keep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedAnalysis {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub date: NaiveDate,
    pub result: ReportAnalysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("{0}")]
    UnsupportedFile(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Could not encode analysis: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::UnsupportedFile(msg) => AppError::ValidationError(msg),
            AnalysisError::Store(e) if e.is_remote_unavailable() => AppError::ExternalService(e.to_string()),
            AnalysisError::Store(e) => AppError::Database(e.to_string()),
            AnalysisError::Serialization(e) => AppError::Internal(e.to_string()),
        }
    }
}

/// Checks the file name has one of the accepted extensions.
pub fn accepted_file(file_name: &str) -> Result<(), AnalysisError> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    if ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(AnalysisError::UnsupportedFile(format!(
            "Unsupported report file '{}'; expected one of {}",
            file_name,
            ACCEPTED_EXTENSIONS.join(", ")
        )))
    }
}
