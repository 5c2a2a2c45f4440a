use axum::Json;
use axum::extract::{Multipart, Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{JobQuery, UserQuery, WithMessage, read_submission};
use crate::error::PipelineError;
use crate::pipeline::download::{InputDownload, OutputDownload, download_input, download_output};
use crate::pipeline::launch::{LaunchedBatch, launch_batches, launch_job};
use crate::pipeline::reconcile::{BatchSnapshot, reconcile_batches};
use crate::pipeline::submit::{SubmitOutcome, create_and_upload};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FileIds {
    pub file_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchIds {
    pub batch_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct JobBatches<T> {
    pub job_id: Uuid,
    pub batches: Vec<T>,
}

pub async fn create_upload_file(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
    multipart: Multipart,
) -> Result<Json<WithMessage<SubmitOutcome>>, PipelineError> {
    let submission = read_submission(multipart).await?;
    let outcome = create_and_upload(
        &state,
        &query.user_id,
        &submission.file_name,
        &submission.bytes,
        &submission.description,
    )
    .await?;
    Ok(WithMessage::new("Data pre-processing and upload done", outcome))
}

pub async fn create_start_batch(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
    Json(input): Json<FileIds>,
) -> Result<Json<WithMessage<JobBatches<LaunchedBatch>>>, PipelineError> {
    let batches = launch_batches(&state, &query.user_id, query.job_id, &input.file_ids).await?;
    Ok(started(query.job_id, batches))
}

pub async fn start_batch_of_job(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<WithMessage<JobBatches<LaunchedBatch>>>, PipelineError> {
    let batches = launch_job(&state, &query.user_id, query.job_id).await?;
    Ok(started(query.job_id, batches))
}

fn started(job_id: Uuid, batches: Vec<LaunchedBatch>) -> Json<WithMessage<JobBatches<LaunchedBatch>>> {
    WithMessage::new(
        format!("Started {} batch(es) of job_id: {job_id}", batches.len()),
        JobBatches { job_id, batches },
    )
}

pub async fn check_batch_status(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
    Json(input): Json<BatchIds>,
) -> Result<Json<WithMessage<JobBatches<BatchSnapshot>>>, PipelineError> {
    let batches = reconcile_batches(&state, &query.user_id, query.job_id, &input.batch_ids).await?;
    Ok(WithMessage::new(
        format!("Batch status of job_id: {}", query.job_id),
        JobBatches {
            job_id: query.job_id,
            batches,
        },
    ))
}

pub async fn download_input_file(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
    Json(input): Json<FileIds>,
) -> Result<Json<WithMessage<InputDownload>>, PipelineError> {
    let download = download_input(&state, &query.user_id, query.job_id, &input.file_ids).await?;
    Ok(WithMessage::new("Input file ready", download))
}

pub async fn download_output_file(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
    Json(input): Json<BatchIds>,
) -> Result<Json<WithMessage<OutputDownload>>, PipelineError> {
    let download = download_output(&state, &query.user_id, query.job_id, &input.batch_ids).await?;
    Ok(WithMessage::new("Output file ready", download))
}
