use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use shared_database::{Order, Query, RecordStore};

use crate::models::{AnalysisError, ReportAnalysis, SavedAnalysis, REPORT_ANALYSES_TABLE};

/// Analyses a patient kept, newest first.
pub struct AnalysisArchive {
    store: Arc<dyn RecordStore>,
}

impl AnalysisArchive {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn save(
        &self,
        user_id: &str,
        file_name: &str,
        result: ReportAnalysis,
        auth_token: Option<&str>,
    ) -> Result<SavedAnalysis, AnalysisError> {
        let now = Utc::now();
        let row = json!({
            "id": Uuid::new_v4().to_string(),
            "user_id": user_id,
            "file_name": file_name,
            "date": now.date_naive(),
            "result": result,
            "created_at": now.to_rfc3339(),
        });

        let saved: SavedAnalysis =
            serde_json::from_value(self.store.insert(REPORT_ANALYSES_TABLE, row, auth_token).await?)?;
        info!("Saved analysis {} of {} for {}", saved.id, file_name, user_id);
        Ok(saved)
    }

    pub async fn list(
        &self,
        user_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<SavedAnalysis>, AnalysisError> {
        let query = Query::new()
            .eq("user_id", user_id)
            .order(Order::desc("created_at"));
        let rows = self.store.select(REPORT_ANALYSES_TABLE, &query, auth_token).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value(row) {
                Ok(saved) => Some(saved),
                Err(e) => {
                    warn!("Skipping malformed saved analysis: {}", e);
                    None
                }
            })
            .collect())
    }
}
