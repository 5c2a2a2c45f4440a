use std::sync::Arc;

use uuid::Uuid;

use crate::config::AppConfig;
use crate::history::{BatchJob, HistoryStore};
use crate::provider::{BatchProvider, ProviderConnector, ProviderCredentials};

/// Everything a request handler or pipeline stage needs, injected once at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn HistoryStore>,
    pub connector: Arc<dyn ProviderConnector>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Resolves a provider from the credentials stored on the job.
    ///
    /// `Ok(None)` when the job is missing, soft-deleted or owned by someone else.
    pub async fn job_provider(
        &self,
        user_id: &str,
        job_id: Uuid,
    ) -> Result<Option<(BatchJob, Arc<dyn BatchProvider>)>, crate::error::PipelineError> {
        let Some(job) = self.store.find_batch_job(user_id, job_id).await? else {
            tracing::warn!(user_id, %job_id, "no live job, provider credentials unavailable");
            return Ok(None);
        };
        let provider = self.connector.connect(&ProviderCredentials {
            endpoint: job.endpoint.clone(),
            api_key: job.api_key.clone(),
        })?;
        Ok(Some((job, provider)))
    }
}
