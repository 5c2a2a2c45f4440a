use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{JobQuery, UserQuery, WithMessage};
use crate::error::{PipelineError, json_error};
use crate::history::{BatchFile, BatchJob, SoftDeleteOutcome, TestJob, UploadedFile};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub user_id: String,
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    pub user_id: String,
    pub batch_id: String,
}

#[derive(Debug, Serialize)]
pub struct JobList<T> {
    pub user_id: String,
    pub jobs: Vec<T>,
    pub total_jobs: usize,
}

#[derive(Debug, Serialize)]
pub struct UploadedFileList {
    pub user_id: String,
    pub job_id: Uuid,
    pub files: Vec<UploadedFile>,
    pub total_files: usize,
}

#[derive(Debug, Serialize)]
pub struct BatchFileList {
    pub user_id: String,
    pub job_id: Uuid,
    pub batches: Vec<BatchFile>,
    pub total_batches: usize,
}

pub async fn list_batch_jobs(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<WithMessage<JobList<BatchJob>>>, PipelineError> {
    let jobs = state.store.list_batch_jobs(&query.user_id).await?;
    if jobs.is_empty() {
        return Err(PipelineError::NotFound(format!(
            "no batch jobs found for user_id: {}",
            query.user_id
        )));
    }
    Ok(WithMessage::new(
        "Batch jobs fetched",
        JobList {
            total_jobs: jobs.len(),
            user_id: query.user_id,
            jobs,
        },
    ))
}

pub async fn list_uploaded_files(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<WithMessage<UploadedFileList>>, PipelineError> {
    let files = state
        .store
        .list_uploaded_files(&query.user_id, query.job_id)
        .await?;
    if files.is_empty() {
        return Err(PipelineError::NotFound(format!(
            "no uploaded files found for job_id: {}",
            query.job_id
        )));
    }
    Ok(WithMessage::new(
        "Uploaded files fetched",
        UploadedFileList {
            total_files: files.len(),
            user_id: query.user_id,
            job_id: query.job_id,
            files,
        },
    ))
}

pub async fn list_batch_files(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<WithMessage<BatchFileList>>, PipelineError> {
    let batches = state
        .store
        .list_batch_files(&query.user_id, query.job_id)
        .await?;
    if batches.is_empty() {
        return Err(PipelineError::NotFound(format!(
            "no batches found for job_id: {}",
            query.job_id
        )));
    }
    Ok(WithMessage::new(
        "Batch files fetched",
        BatchFileList {
            total_batches: batches.len(),
            user_id: query.user_id,
            job_id: query.job_id,
            batches,
        },
    ))
}

pub async fn list_test_jobs(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<WithMessage<JobList<TestJob>>>, PipelineError> {
    let jobs = state.store.list_test_jobs(&query.user_id).await?;
    if jobs.is_empty() {
        return Err(PipelineError::NotFound(format!(
            "no test jobs found for user_id: {}",
            query.user_id
        )));
    }
    Ok(WithMessage::new(
        "Test jobs fetched",
        JobList {
            total_jobs: jobs.len(),
            user_id: query.user_id,
            jobs,
        },
    ))
}

fn soft_deleted(outcome: SoftDeleteOutcome, what: String) -> Response {
    match outcome {
        SoftDeleteOutcome::Deleted => {
            Json(json!({ "message": format!("{what} deleted") })).into_response()
        }
        SoftDeleteOutcome::AlreadyDeleted => {
            json_error(StatusCode::BAD_REQUEST, format!("{what} already deleted"))
        }
        SoftDeleteOutcome::NotFound => json_error(StatusCode::NOT_FOUND, format!("{what} not found")),
    }
}

pub async fn delete_batch_job(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Response, PipelineError> {
    let outcome = state
        .store
        .soft_delete_batch_job(&query.user_id, query.job_id)
        .await?;
    tracing::info!(user_id = %query.user_id, job_id = %query.job_id, ?outcome, "batch job delete");
    Ok(soft_deleted(outcome, format!("batch job {}", query.job_id)))
}

pub async fn delete_uploaded_file(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, PipelineError> {
    let outcome = state
        .store
        .soft_delete_uploaded_file(&query.user_id, &query.file_id)
        .await?;
    tracing::info!(user_id = %query.user_id, file_id = %query.file_id, ?outcome, "uploaded file delete");
    Ok(soft_deleted(outcome, format!("uploaded file {}", query.file_id)))
}

pub async fn delete_batch_file(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
) -> Result<Response, PipelineError> {
    let outcome = state
        .store
        .soft_delete_batch_file(&query.user_id, &query.batch_id)
        .await?;
    tracing::info!(user_id = %query.user_id, batch_id = %query.batch_id, ?outcome, "batch file delete");
    Ok(soft_deleted(outcome, format!("batch {}", query.batch_id)))
}

pub async fn delete_test_job(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Response, PipelineError> {
    let outcome = state
        .store
        .soft_delete_test_job(&query.user_id, query.job_id)
        .await?;
    tracing::info!(user_id = %query.user_id, job_id = %query.job_id, ?outcome, "test job delete");
    Ok(soft_deleted(outcome, format!("test job {}", query.job_id)))
}
