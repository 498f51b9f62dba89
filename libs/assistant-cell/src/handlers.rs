use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::debug;

use shared_database::PortalContext;
use shared_models::error::AppError;
use shared_utils::extractor::Actor;
use shared_utils::validation::require_non_empty;

use crate::models::{
    accepted_file, AnalyzeReportRequest, AssistantMessage, AssistantReply, ReportAnalysis,
    SavedAnalysis,
};
use crate::services::{
    AnalysisArchive, HealthAssistant, ReportAnalyzer, ScriptedAssistant, ScriptedReportAnalyzer,
};

#[derive(Clone)]
pub struct AssistantState {
    pub ctx: PortalContext,
    pub assistant: Arc<dyn HealthAssistant>,
    pub analyzer: Arc<dyn ReportAnalyzer>,
    pub archive: Arc<AnalysisArchive>,
}

impl AssistantState {
    /// Scripted assistant and analyzer, with saved analyses in the record store.
    pub fn new(ctx: PortalContext) -> Self {
        Self {
            assistant: Arc::new(ScriptedAssistant::new()),
            analyzer: Arc::new(ScriptedReportAnalyzer::new()),
            archive: Arc::new(AnalysisArchive::new(ctx.store.clone())),
            ctx,
        }
    }
}

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<AssistantState>,
    actor: Actor,
    Json(request): Json<AssistantMessage>,
) -> Result<Json<AssistantReply>, AppError> {
    require_non_empty("Message", &request.message)?;

    let reply = state.assistant.respond(&request.message);
    debug!("Assistant answered {} on {:?}", actor.id(), reply.topic);
    Ok(Json(reply))
}

fn analyze(state: &AssistantState, request: &AnalyzeReportRequest) -> Result<ReportAnalysis, AppError> {
    let file_name = request.file_name.trim();
    require_non_empty("File name", file_name)?;
    accepted_file(file_name)?;
    Ok(state.analyzer.analyze(file_name))
}

#[axum::debug_handler]
pub async fn analyze_report(
    State(state): State<AssistantState>,
    actor: Actor,
    Json(request): Json<AnalyzeReportRequest>,
) -> Result<Json<ReportAnalysis>, AppError> {
    let analysis = analyze(&state, &request)?;
    debug!("Analysed {} for {}", request.file_name, actor.id());
    Ok(Json(analysis))
}

#[axum::debug_handler]
pub async fn save_analysis(
    State(state): State<AssistantState>,
    actor: Actor,
    Json(request): Json<AnalyzeReportRequest>,
) -> Result<(StatusCode, Json<SavedAnalysis>), AppError> {
    let analysis = analyze(&state, &request)?;
    let saved = state
        .archive
        .save(actor.id(), request.file_name.trim(), analysis, Some(&actor.token))
        .await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

#[axum::debug_handler]
pub async fn saved_analyses(
    State(state): State<AssistantState>,
    actor: Actor,
) -> Result<Json<Value>, AppError> {
    let analyses = state.archive.list(actor.id(), Some(&actor.token)).await?;

    Ok(Json(json!({
        "analyses": analyses,
        "total": analyses.len()
    })))
}
