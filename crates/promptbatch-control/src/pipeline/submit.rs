use chrono::Utc;
use promptbatch_dataset::jsonl::encode_requests;
use promptbatch_dataset::transform::PROMPT_COLUMN;
use promptbatch_dataset::{load_dataset, transform};
use serde::Serialize;
use uuid::Uuid;

use super::JobDescription;
use crate::error::PipelineError;
use crate::history::{
    BATCH_NOT_STARTED, BatchJob, FILE_STATUS_FAILED, FILE_STATUS_PROCESSED, JOB_TYPE_BATCH,
    UploadedFile,
};
use crate::provider::{BatchProvider, ProviderError};
use crate::state::AppState;

/// Where a chunk file ended up on the provider side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkUpload {
    /// Set only once the provider reports the file as processed.
    pub file_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub job_id: Uuid,
    pub total_rows_processed: usize,
    pub chunks: usize,
    pub files: Vec<UploadedFile>,
}

/// Uploads one chunk file and re-reads its processing status.
pub async fn submit_chunk(
    provider: &dyn BatchProvider,
    file_name: &str,
    content: Vec<u8>,
) -> Result<ChunkUpload, ProviderError> {
    let uploaded = provider.upload_batch_file(file_name, content).await?;
    let file = provider.retrieve_file(&uploaded.id).await?;
    if file.is_processed() {
        return Ok(ChunkUpload {
            file_id: Some(file.id),
            status: FILE_STATUS_PROCESSED.to_string(),
        });
    }
    tracing::warn!(file_id = %file.id, status = %file.status, "uploaded file not processed");
    Ok(ChunkUpload {
        file_id: None,
        status: file.status.to_lowercase(),
    })
}

/// Loads, transforms and chunks a dataset, then uploads every chunk as a batch input file.
///
/// A chunk whose upload fails is recorded as `failed` and the remaining chunks still go out.
pub async fn create_and_upload(
    state: &AppState,
    user_id: &str,
    file_name: &str,
    bytes: &[u8],
    description: &JobDescription,
) -> Result<SubmitOutcome, PipelineError> {
    let raw = load_dataset(file_name, bytes)?;
    if raw.is_empty() {
        return Err(PipelineError::configuration("dataset has no rows"));
    }
    let transformed = transform(raw, description.unique_id_field(), &description.template())?;
    let dataset = transformed.dataset;
    if dataset.is_empty() {
        return Err(PipelineError::configuration(
            "dataset has no usable rows after cleaning",
        ));
    }

    let plan = description.chunk_plan()?;
    let chunks = plan.split(&dataset)?;
    let credentials = &description.credentials;
    let provider = state.connector.connect(&credentials.provider)?;

    let now = Utc::now();
    let job = BatchJob {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        job_title: description.job_title.clone(),
        file_name: file_name.to_string(),
        job_type: JOB_TYPE_BATCH.to_string(),
        chunks: chunks.len() as i32,
        chunk_size: plan.rows_per_chunk(dataset.len()) as i32,
        total_rows_processed: dataset.len() as i64,
        model: credentials.deployment_name.clone(),
        endpoint: credentials.provider.endpoint.clone(),
        api_key: credentials.provider.api_key.clone(),
        prompt: vec![description.prompt.clone()],
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    state.store.upsert_batch_job(&job).await?;
    tracing::info!(job_id = %job.id, user_id, rows = dataset.len(), chunks = chunks.len(), "batch job created");

    let mut files = Vec::with_capacity(chunks.len());
    for (index, chunk) in chunks.iter().enumerate() {
        let chunk_no = format!("chunk_{}", index + 1);
        let content = encode_requests(
            chunk,
            &transformed.id_column,
            PROMPT_COLUMN,
            &credentials.deployment_name,
            credentials.temperature,
        )?;

        let upload_name = format!("{file_name}_{chunk_no}.jsonl");
        let upload = match submit_chunk(provider.as_ref(), &upload_name, content).await {
            Ok(upload) => upload,
            Err(err) => {
                tracing::warn!(job_id = %job.id, %chunk_no, error = %err, "chunk upload failed");
                ChunkUpload {
                    file_id: None,
                    status: FILE_STATUS_FAILED.to_string(),
                }
            }
        };

        let now = Utc::now();
        let record = UploadedFile {
            id: Uuid::new_v4(),
            file_id: upload.file_id,
            user_id: user_id.to_string(),
            job_id: job.id,
            job_type: JOB_TYPE_BATCH.to_string(),
            file_status: upload.status,
            batch_status: BATCH_NOT_STARTED.to_string(),
            chunk_no,
            total_rows_processed: chunk.len() as i64,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.store.upsert_uploaded_file(&record).await?;
        files.push(record);
    }

    Ok(SubmitOutcome {
        job_id: job.id,
        total_rows_processed: dataset.len(),
        chunks: chunks.len(),
        files,
    })
}
