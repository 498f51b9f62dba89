pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use handlers::AssistantState;
pub use models::*;
pub use router::*;
pub use services::{
    AnalysisArchive, HealthAssistant, ReportAnalyzer, ScriptedAssistant, ScriptedReportAnalyzer,
};
