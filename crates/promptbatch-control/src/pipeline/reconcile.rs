use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::{STATUS_COMPLETED, STATUS_INVALID_BATCH_ID, is_terminal};
use crate::error::PipelineError;
use crate::history::BatchFile;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSnapshot {
    pub status: String,
    pub batch_id: String,
    pub output_file_id: Option<String>,
}

impl From<&BatchFile> for BatchSnapshot {
    fn from(file: &BatchFile) -> Self {
        Self {
            status: file.status.clone(),
            batch_id: file.batch_id.clone(),
            output_file_id: file.output_file_id.clone(),
        }
    }
}

/// Brings the stored status of each batch up to date with the provider.
///
/// Terminal batches are answered from the store. A row is written only when the
/// observed status differs from the stored one.
pub async fn reconcile_batches(
    state: &AppState,
    user_id: &str,
    job_id: Uuid,
    batch_ids: &[String],
) -> Result<Vec<BatchSnapshot>, PipelineError> {
    let provider = state
        .job_provider(user_id, job_id)
        .await?
        .map(|(_, provider)| provider);

    let mut snapshots = Vec::with_capacity(batch_ids.len());
    for batch_id in batch_ids {
        let stored = state.store.find_batch_file(user_id, job_id, batch_id).await?;
        if let Some(stored) = stored.as_ref().filter(|s| is_terminal(&s.status)) {
            snapshots.push(BatchSnapshot::from(stored));
            continue;
        }

        let Some(provider) = provider.as_ref() else {
            snapshots.push(BatchSnapshot {
                status: STATUS_INVALID_BATCH_ID.to_string(),
                batch_id: batch_id.clone(),
                output_file_id: None,
            });
            continue;
        };

        let (status, output_file_id) = match provider.retrieve_batch(batch_id).await {
            Ok(batch) if batch.status == STATUS_COMPLETED => (batch.status, batch.output_file_id),
            Ok(batch) => (batch.status, None),
            Err(err) => {
                tracing::warn!(%job_id, %batch_id, error = %err, "batch poll failed");
                (STATUS_INVALID_BATCH_ID.to_string(), None)
            }
        };

        match stored {
            Some(mut stored) if stored.status != status => {
                tracing::info!(%job_id, %batch_id, from = %stored.status, to = %status, "batch status changed");
                stored.status = status.clone();
                if status == STATUS_COMPLETED {
                    stored.output_file_id = output_file_id.clone();
                }
                stored.updated_at = Utc::now();
                state.store.upsert_batch_file(&stored).await?;
            }
            Some(_) => {}
            None => tracing::warn!(%job_id, %batch_id, "batch not recorded for this job"),
        }

        snapshots.push(BatchSnapshot {
            status,
            batch_id: batch_id.clone(),
            output_file_id,
        });
    }
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, sample_batch_file, sample_job, test_state};

    async fn seeded(
        provider: &FakeProvider,
        stored_status: &str,
    ) -> (AppState, crate::history::BatchJob) {
        let state = test_state(provider.clone()).await;
        let job = sample_job("u1");
        state.store.upsert_batch_job(&job).await.unwrap();
        state
            .store
            .upsert_batch_file(&sample_batch_file(&job, "batch-1", "file-1", stored_status))
            .await
            .unwrap();
        (state, job)
    }

    fn ids() -> Vec<String> {
        vec!["batch-1".to_string()]
    }

    #[tokio::test]
    async fn stored_completed_batch_is_not_polled() {
        let provider = FakeProvider::default();
        let (state, job) = seeded(&provider, "validating").await;
        let mut done = sample_batch_file(&job, "batch-1", "file-1", "completed");
        done.output_file_id = Some("out-1".to_string());
        state.store.upsert_batch_file(&done).await.unwrap();

        let out = reconcile_batches(&state, "u1", job.id, &ids()).await.unwrap();
        assert_eq!(
            out,
            vec![BatchSnapshot {
                status: "completed".to_string(),
                batch_id: "batch-1".to_string(),
                output_file_id: Some("out-1".to_string()),
            }]
        );
        assert_eq!(provider.retrieve_batch_calls(), 0);
    }

    #[tokio::test]
    async fn unchanged_status_is_not_rewritten() {
        let provider = FakeProvider::default();
        provider.set_batch("batch-1", "in_progress", None);
        let (state, job) = seeded(&provider, "validating").await;

        let first = reconcile_batches(&state, "u1", job.id, &ids()).await.unwrap();
        let after_first = state.store.find_batch_file("u1", job.id, "batch-1").await.unwrap().unwrap();
        let second = reconcile_batches(&state, "u1", job.id, &ids()).await.unwrap();
        let after_second = state.store.find_batch_file("u1", job.id, "batch-1").await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(after_first.status, "in_progress");
        assert_eq!(after_first.updated_at, after_second.updated_at);
        assert_eq!(provider.retrieve_batch_calls(), 2);
    }

    #[tokio::test]
    async fn completion_records_output_and_stops_polling() {
        let provider = FakeProvider::default();
        provider.set_batch("batch-1", "completed", Some("out-1"));
        let (state, job) = seeded(&provider, "in_progress").await;

        let out = reconcile_batches(&state, "u1", job.id, &ids()).await.unwrap();
        assert_eq!(out[0].output_file_id.as_deref(), Some("out-1"));
        let stored = state.store.find_batch_file("u1", job.id, "batch-1").await.unwrap().unwrap();
        assert_eq!(stored.status, "completed");
        assert_eq!(stored.output_file_id.as_deref(), Some("out-1"));

        reconcile_batches(&state, "u1", job.id, &ids()).await.unwrap();
        assert_eq!(provider.retrieve_batch_calls(), 1);
    }

    #[tokio::test]
    async fn failed_batch_has_no_output() {
        let provider = FakeProvider::default();
        provider.set_batch("batch-1", "failed", Some("ignored"));
        let (state, job) = seeded(&provider, "in_progress").await;

        let out = reconcile_batches(&state, "u1", job.id, &ids()).await.unwrap();
        assert_eq!(out[0].status, "failed");
        assert_eq!(out[0].output_file_id, None);
        let stored = state.store.find_batch_file("u1", job.id, "batch-1").await.unwrap().unwrap();
        assert_eq!(stored.output_file_id, None);
    }

    #[tokio::test]
    async fn stored_failed_batch_is_not_polled() {
        let provider = FakeProvider::default();
        provider.set_batch("batch-1", "in_progress", None);
        let (state, job) = seeded(&provider, "failed").await;

        let out = reconcile_batches(&state, "u1", job.id, &ids()).await.unwrap();
        assert_eq!(out[0].status, "failed");
        assert_eq!(out[0].output_file_id, None);
        assert_eq!(provider.retrieve_batch_calls(), 0);
    }

    #[tokio::test]
    async fn poll_error_is_stored_as_invalid_and_retried() {
        let provider = FakeProvider::default();
        let (state, job) = seeded(&provider, "in_progress").await;

        let first = reconcile_batches(&state, "u1", job.id, &ids()).await.unwrap();
        assert_eq!(first[0].status, STATUS_INVALID_BATCH_ID);
        let stored = state.store.find_batch_file("u1", job.id, "batch-1").await.unwrap().unwrap();
        assert_eq!(stored.status, STATUS_INVALID_BATCH_ID);

        provider.set_batch("batch-1", "in_progress", None);
        let second = reconcile_batches(&state, "u1", job.id, &ids()).await.unwrap();
        assert_eq!(second[0].status, "in_progress");
        assert_eq!(provider.retrieve_batch_calls(), 2);
        let stored = state.store.find_batch_file("u1", job.id, "batch-1").await.unwrap().unwrap();
        assert_eq!(stored.status, "in_progress");
    }

    #[tokio::test]
    async fn unknown_batch_is_invalid() {
        let provider = FakeProvider::default();
        let (state, job) = seeded(&provider, "validating").await;

        let out = reconcile_batches(&state, "u1", job.id, &["batch-404".to_string()])
            .await
            .unwrap();
        assert_eq!(out[0].status, STATUS_INVALID_BATCH_ID);
        assert_eq!(out[0].batch_id, "batch-404");
    }

    #[tokio::test]
    async fn missing_credentials_report_invalid() {
        let provider = FakeProvider::default();
        let state = test_state(provider.clone()).await;

        let out = reconcile_batches(&state, "u1", Uuid::new_v4(), &ids()).await.unwrap();
        assert_eq!(out[0].status, STATUS_INVALID_BATCH_ID);
        assert_eq!(provider.retrieve_batch_calls(), 0);
    }
}
