use std::sync::Arc;

use axum::{
    extract::{multipart::Field, Multipart, Query, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentSchool;
use crate::api::validation::validate_upload;
use crate::core::config::UploadSettings;
use crate::core::state::AppState;
use crate::core::time::{format_offset, now_utc};
use crate::repositories::batches::BatchRun;
use crate::schemas::batch::{
    AnalyticsResponse, BatchOutcome, BatchResponse, OutcomeResponse, SortQuery,
};
use crate::schemas::document::{Document, ScriptInput};
use crate::services::uploads::UploadRejection;
use crate::services::{batch_orchestrator, result_aggregator, result_sorter};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_batch))
        .route("/current", get(current_batch))
        .route("/current/analytics", get(current_analytics))
}

struct BatchUpload {
    question_paper: Document,
    memo: Option<Document>,
    scripts: Vec<Document>,
}

async fn create_batch(
    State(state): State<AppState>,
    CurrentSchool(school): CurrentSchool,
    multipart: Multipart,
) -> Result<Json<BatchResponse>, ApiError> {
    let upload = read_batch_upload(multipart, state.settings().uploads()).await?;

    let batch_id = Uuid::new_v4().to_string();
    tracing::info!(
        batch_id = %batch_id,
        school_id = %school.id,
        scripts = upload.scripts.len(),
        "Batch upload accepted"
    );

    let question_paper = upload.question_paper.filename.clone();
    let memo_name = upload.memo.as_ref().map(|memo| memo.filename.clone());
    let scripts: Vec<Arc<ScriptInput>> =
        upload.scripts.into_iter().map(|document| Arc::new(ScriptInput::new(document))).collect();

    let outcomes = batch_orchestrator::run_batch(
        state.marker(),
        Arc::new(upload.question_paper),
        scripts,
        upload.memo.map(Arc::new),
        state.settings().batch().max_concurrent_marking,
    )
    .await;
    let analytics = result_aggregator::aggregate(&outcomes);

    let run = state
        .batches()
        .replace(BatchRun {
            id: batch_id,
            school_id: school.id,
            created_at: now_utc(),
            question_paper,
            memo: memo_name,
            outcomes,
            analytics,
        })
        .await;

    Ok(Json(batch_response(&run, run.outcomes.iter())))
}

async fn current_batch(
    State(state): State<AppState>,
    CurrentSchool(school): CurrentSchool,
    Query(query): Query<SortQuery>,
) -> Result<Json<BatchResponse>, ApiError> {
    let run = current_run(&state, &school.id).await?;
    let sorted = result_sorter::sort_outcomes(&run.outcomes, query.sort, query.direction);
    Ok(Json(batch_response(&run, sorted)))
}

async fn current_analytics(
    State(state): State<AppState>,
    CurrentSchool(school): CurrentSchool,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let run = current_run(&state, &school.id).await?;
    Ok(Json(AnalyticsResponse { analytics: run.analytics.clone() }))
}

pub(crate) async fn current_run(
    state: &AppState,
    school_id: &str,
) -> Result<Arc<BatchRun>, ApiError> {
    state
        .batches()
        .current(school_id)
        .await
        .ok_or_else(|| ApiError::NotFound("No batch has been marked yet.".to_string()))
}

fn batch_response<'a, I>(run: &BatchRun, outcomes: I) -> BatchResponse
where
    I: IntoIterator<Item = &'a BatchOutcome>,
{
    let outcomes: Vec<OutcomeResponse> =
        outcomes.into_iter().map(OutcomeResponse::from_outcome).collect();
    let marked_count = run.marked_count();

    BatchResponse {
        batch_id: run.id.clone(),
        created_at: format_offset(run.created_at),
        question_paper: run.question_paper.clone(),
        memo: run.memo.clone(),
        marked_count,
        failed_count: run.outcomes.len() - marked_count,
        outcomes,
        analytics: run.analytics.clone(),
    }
}

async fn read_batch_upload(
    mut multipart: Multipart,
    settings: &UploadSettings,
) -> Result<BatchUpload, ApiError> {
    let mut question_paper = None;
    let mut memo = None;
    let mut scripts = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "question_paper" => {
                if question_paper.is_some() {
                    return Err(ApiError::BadRequest(
                        "Upload exactly one question paper.".to_string(),
                    ));
                }
                question_paper = Some(read_document(field, settings).await?);
            }
            "memo" => {
                if memo.is_some() {
                    return Err(ApiError::BadRequest("Upload at most one memo.".to_string()));
                }
                memo = Some(read_document(field, settings).await?);
            }
            "scripts" => {
                if scripts.len() as u64 >= settings.max_scripts_per_batch {
                    return Err(ApiError::BadRequest(format!(
                        "You can upload at most {} scripts per batch.",
                        settings.max_scripts_per_batch
                    )));
                }
                scripts.push(read_document(field, settings).await?);
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let question_paper = question_paper
        .ok_or_else(|| ApiError::BadRequest("Please upload the question paper.".to_string()))?;
    if scripts.is_empty() {
        return Err(ApiError::BadRequest(
            "Please upload at least one learner script.".to_string(),
        ));
    }

    Ok(BatchUpload { question_paper, memo, scripts })
}

async fn read_document(
    mut field: Field<'_>,
    settings: &UploadSettings,
) -> Result<Document, ApiError> {
    let filename = field.file_name().unwrap_or("upload").to_string();
    let content_type = field.content_type().map(|s| s.to_string());
    let max_bytes = settings.max_upload_bytes();

    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
    {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(ApiError::BadRequest(
                UploadRejection::too_large(&filename, settings).to_string(),
            ));
        }
        bytes.extend_from_slice(&chunk);
    }

    validate_upload(&filename, content_type.as_deref(), bytes, settings)
}
