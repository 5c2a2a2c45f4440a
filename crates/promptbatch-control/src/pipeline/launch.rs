use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::{STATUS_COMPLETED, STATUS_VALIDATING};
use crate::error::PipelineError;
use crate::history::{
    BATCH_NOT_STARTED, BATCH_STARTED, BatchFile, FILE_STATUS_PROCESSED, JOB_TYPE_BATCH,
};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchedBatch {
    pub batch_id: String,
    pub file_id: String,
    pub output_file_id: Option<String>,
    pub status: String,
    pub chunk_no: String,
    pub total_rows_processed: i64,
}

impl From<&BatchFile> for LaunchedBatch {
    fn from(file: &BatchFile) -> Self {
        Self {
            batch_id: file.batch_id.clone(),
            file_id: file.file_id.clone(),
            output_file_id: file.output_file_id.clone(),
            status: file.status.clone(),
            chunk_no: file.chunk_no.clone(),
            total_rows_processed: file.total_rows_processed,
        }
    }
}

/// Creates one provider batch per uploaded file and records it.
///
/// Files that are unknown to the job are skipped. When batch creation fails the
/// file's `batch_status` is put back to what it was and the next file is tried.
pub async fn launch_batches(
    state: &AppState,
    user_id: &str,
    job_id: Uuid,
    file_ids: &[String],
) -> Result<Vec<LaunchedBatch>, PipelineError> {
    let Some((_job, provider)) = state.job_provider(user_id, job_id).await? else {
        return Ok(Vec::new());
    };

    let mut launched = Vec::with_capacity(file_ids.len());
    for file_id in file_ids {
        let Some(mut upload) = state
            .store
            .find_uploaded_file(user_id, job_id, file_id)
            .await?
        else {
            tracing::warn!(%job_id, %file_id, "file not uploaded for this job, skipping");
            continue;
        };

        let previous = std::mem::replace(&mut upload.batch_status, BATCH_STARTED.to_string());
        upload.updated_at = Utc::now();
        state.store.upsert_uploaded_file(&upload).await?;

        let created = match provider.create_batch(file_id).await {
            Ok(created) => created,
            Err(err) => {
                tracing::warn!(%job_id, %file_id, error = %err, "batch creation failed, restoring file state");
                upload.batch_status = previous;
                upload.updated_at = Utc::now();
                state.store.upsert_uploaded_file(&upload).await?;
                continue;
            }
        };

        let (status, output_file_id) = match provider.retrieve_batch(&created.id).await {
            Ok(batch) if batch.status == STATUS_COMPLETED => (batch.status, batch.output_file_id),
            Ok(batch) => (batch.status, None),
            Err(err) => {
                tracing::warn!(batch_id = %created.id, error = %err, "initial batch poll failed");
                (STATUS_VALIDATING.to_string(), None)
            }
        };

        let now = Utc::now();
        let record = BatchFile {
            batch_id: created.id,
            user_id: user_id.to_string(),
            job_id,
            file_id: file_id.clone(),
            output_file_id,
            job_type: JOB_TYPE_BATCH.to_string(),
            status,
            chunk_no: upload.chunk_no.clone(),
            total_rows_processed: upload.total_rows_processed,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.store.upsert_batch_file(&record).await?;
        tracing::info!(%job_id, batch_id = %record.batch_id, %file_id, status = %record.status, "batch launched");
        launched.push(LaunchedBatch::from(&record));
    }
    Ok(launched)
}

/// Launches every processed, not yet started file of a job.
pub async fn launch_job(
    state: &AppState,
    user_id: &str,
    job_id: Uuid,
) -> Result<Vec<LaunchedBatch>, PipelineError> {
    let file_ids: Vec<String> = state
        .store
        .list_uploaded_files(user_id, job_id)
        .await?
        .into_iter()
        .filter(|f| f.file_status == FILE_STATUS_PROCESSED && f.batch_status == BATCH_NOT_STARTED)
        .filter_map(|f| f.file_id)
        .collect();
    if file_ids.is_empty() {
        tracing::info!(%job_id, "no files waiting for a batch");
        return Ok(Vec::new());
    }
    launch_batches(state, user_id, job_id, &file_ids).await
}
