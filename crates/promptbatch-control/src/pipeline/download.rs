use promptbatch_dataset::materialize::{UNIQUE_ID_COLUMN, parse_input_jsonl, parse_output_jsonl};
use promptbatch_dataset::summary::{export_table, summarize_usage};
use promptbatch_dataset::{Dataset, TableExport, UsageSummary};
use serde::Serialize;
use uuid::Uuid;

use super::reconcile::{BatchSnapshot, reconcile_batches};
use crate::error::PipelineError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct InputDownload {
    #[serde(flatten)]
    pub table: TableExport,
    pub skipped_file_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputDownload {
    #[serde(flatten)]
    pub table: TableExport,
    #[serde(flatten)]
    pub usage: UsageSummary,
    pub batches: Vec<BatchSnapshot>,
    /// Batches without an output file yet.
    pub pending_batch_ids: Vec<String>,
}

/// Rebuilds the request table of the given uploaded files.
pub async fn download_input(
    state: &AppState,
    user_id: &str,
    job_id: Uuid,
    file_ids: &[String],
) -> Result<InputDownload, PipelineError> {
    let Some((_job, provider)) = state.job_provider(user_id, job_id).await? else {
        return Err(PipelineError::NotFound(format!("batch job {job_id} not found")));
    };

    let mut dataset = Dataset::default();
    let mut skipped_file_ids = Vec::new();
    for file_id in file_ids {
        if state
            .store
            .find_uploaded_file(user_id, job_id, file_id)
            .await?
            .is_none()
        {
            tracing::warn!(%job_id, %file_id, "file not uploaded for this job, skipping");
            skipped_file_ids.push(file_id.clone());
            continue;
        }
        let content = provider.file_content(file_id).await?;
        dataset.append(parse_input_jsonl(&content));
    }
    dataset.sort_by_column(UNIQUE_ID_COLUMN);

    Ok(InputDownload {
        table: export_table(&dataset, state.config.preview_rows)?,
        skipped_file_ids,
    })
}

/// Reconciles the given batches, then merges the output files of the completed ones.
pub async fn download_output(
    state: &AppState,
    user_id: &str,
    job_id: Uuid,
    batch_ids: &[String],
) -> Result<OutputDownload, PipelineError> {
    let Some((_job, provider)) = state.job_provider(user_id, job_id).await? else {
        return Err(PipelineError::NotFound(format!("batch job {job_id} not found")));
    };
    let batches = reconcile_batches(state, user_id, job_id, batch_ids).await?;

    let mut dataset = Dataset::default();
    let mut pending_batch_ids = Vec::new();
    for batch in &batches {
        let Some(output_file_id) = batch.output_file_id.as_deref() else {
            pending_batch_ids.push(batch.batch_id.clone());
            continue;
        };
        let content = provider.file_content(output_file_id).await?;
        dataset.append(parse_output_jsonl(&content));
    }
    dataset.sort_by_column(UNIQUE_ID_COLUMN);
    tracing::info!(%job_id, rows = dataset.len(), pending = pending_batch_ids.len(), "batch output merged");

    Ok(OutputDownload {
        table: export_table(&dataset, state.config.preview_rows)?,
        usage: summarize_usage(&dataset, state.config.token_costs),
        batches,
        pending_batch_ids,
    })
}
