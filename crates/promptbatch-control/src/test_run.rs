//! Synchronous trial of a prompt on the first rows of a dataset.

use std::sync::Arc;

use chrono::Utc;
use promptbatch_dataset::dataset::display_value;
use promptbatch_dataset::jsonl::ChatMessage;
use promptbatch_dataset::materialize::{Usage, extract_structured_output};
use promptbatch_dataset::summary::{export_table, summarize_usage};
use promptbatch_dataset::transform::PROMPT_COLUMN;
use promptbatch_dataset::{
    Dataset, Row, TableExport, UsageSummary, load_dataset, split_into_chunks, transform,
};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::history::{JOB_TYPE_TEST, TestJob};
use crate::pipeline::{JobDescription, STATUS_COMPLETED};
use crate::provider::{BatchProvider, RetryPolicy, with_retry};
use crate::state::AppState;

pub const ERROR_COLUMN: &str = "error";

#[derive(Debug, Clone, Serialize)]
pub struct TestRunReport {
    pub job_id: Uuid,
    pub job_title: String,
    #[serde(flatten)]
    pub table: TableExport,
    #[serde(flatten)]
    pub usage: UsageSummary,
}

#[derive(Debug, Clone)]
struct ChatCall {
    deployment: String,
    temperature: f64,
    retry: RetryPolicy,
}

/// Runs the prompt on the first `chunkSize` rows and records the run.
///
/// Rows are spread over a fixed pool of workers. A row whose model call fails
/// keeps its data and carries the failure in its `error` column.
pub async fn run_test_prompt(
    state: &AppState,
    user_id: &str,
    file_name: &str,
    bytes: &[u8],
    description: &JobDescription,
) -> Result<TestRunReport, PipelineError> {
    let raw = load_dataset(file_name, bytes)?;
    if raw.is_empty() {
        return Err(PipelineError::configuration("dataset has no rows"));
    }
    let sample_size = description
        .config
        .chunk_size
        .filter(|n| *n > 0)
        .ok_or_else(|| PipelineError::configuration("config.chunkSize is required for a test run"))?;

    let transformed = transform(raw, description.unique_id_field(), &description.template())?;
    let sample = transformed.dataset.head(sample_size);
    if sample.is_empty() {
        return Err(PipelineError::configuration(
            "dataset has no usable rows after cleaning",
        ));
    }

    let credentials = &description.credentials;
    let provider = state.connector.connect(&credentials.provider)?;
    let call = ChatCall {
        deployment: credentials.deployment_name.clone(),
        temperature: credentials.temperature,
        retry: state.config.chat_retry,
    };

    let workers = state.config.test_workers.min(sample.len()).max(1);
    let mut set = JoinSet::new();
    for slice in split_into_chunks(&sample, workers)? {
        let provider = Arc::clone(&provider);
        let call = call.clone();
        let id_column = transformed.id_column.clone();
        set.spawn(async move {
            let mut answered = Vec::with_capacity(slice.len());
            for row in slice.into_rows() {
                answered.push(answer_row(provider.as_ref(), &call, row, &id_column).await);
            }
            answered
        });
    }

    let mut output = Dataset::default();
    while let Some(joined) = set.join_next().await {
        for row in joined? {
            output.push_row(row);
        }
    }
    output.sort_by_column(&transformed.id_column);

    let table = export_table(&output, state.config.preview_rows)?;
    let usage = summarize_usage(&output, state.config.token_costs);

    let now = Utc::now();
    let record = TestJob {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        job_title: description.job_title.clone(),
        file_name: file_name.to_string(),
        job_type: JOB_TYPE_TEST.to_string(),
        status: STATUS_COMPLETED.to_string(),
        total_rows_processed: output.len() as i64,
        model: credentials.deployment_name.clone(),
        avg_input_token: usage.average_input_token,
        avg_completion_token: usage.average_completion_token,
        avg_total_token: usage.average_total_token,
        avg_cost_per_row: usage.average_cost_per_row,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    state.store.upsert_test_job(&record).await?;
    tracing::info!(job_id = %record.id, user_id, rows = output.len(), workers, "test prompt run finished");

    Ok(TestRunReport {
        job_id: record.id,
        job_title: record.job_title,
        table,
        usage,
    })
}

async fn answer_row(provider: &dyn BatchProvider, call: &ChatCall, mut row: Row, id_column: &str) -> Row {
    let prompt = row.get(PROMPT_COLUMN).map(display_value).unwrap_or_default();
    let messages = [ChatMessage::system(prompt)];
    let deployment = call.deployment.as_str();
    let messages = &messages[..];
    let temperature = call.temperature;

    let reply = with_retry(call.retry, move || {
        provider.chat_completion(deployment, messages, temperature)
    })
    .await;

    match reply {
        Ok(body) => {
            extract_structured_output(body.first_content()).apply_to(&mut row);
            body.usage.unwrap_or_default().insert_into(&mut row);
            row.insert(ERROR_COLUMN.to_string(), Value::Null);
        }
        Err(err) => {
            let id = row.get(id_column).map(display_value).unwrap_or_default();
            tracing::error!(unique_id = %id, error = %err, "test prompt row failed");
            Usage::default().insert_into(&mut row);
            row.insert(ERROR_COLUMN.to_string(), Value::String(err.to_string()));
        }
    }
    row
}
