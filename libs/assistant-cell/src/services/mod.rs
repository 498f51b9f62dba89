pub mod analysis;
pub mod archive;
pub mod scripted;

pub use analysis::{ReportAnalyzer, ScriptedReportAnalyzer};
pub use archive::AnalysisArchive;
pub use scripted::{HealthAssistant, ScriptedAssistant};
