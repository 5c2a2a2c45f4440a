//! Dataset → chunk files → provider batches → results.

pub mod download;
pub mod launch;
pub mod reconcile;
pub mod submit;

use indexmap::IndexMap;
use promptbatch_dataset::{ChunkPlan, PromptTemplate};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::PipelineError;
use crate::provider::ProviderCredentials;

pub const STATUS_VALIDATING: &str = "validating";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_INVALID_BATCH_ID: &str = "invalid-batch-id";

/// `completed` and `failed` batches are never polled again.
pub fn is_terminal(status: &str) -> bool {
    status == STATUS_COMPLETED || status == STATUS_FAILED
}

/// The JSON `description` field sent alongside an uploaded dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDescription {
    pub job_title: String,
    pub prompt: String,
    #[serde(default)]
    pub placeholder_field: IndexMap<String, String>,
    #[serde(default)]
    pub unique_id_field: Option<String>,
    #[serde(default)]
    pub output_field: Map<String, Value>,
    pub config: ChunkConfig,
    pub credentials: JobCredentials,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkConfig {
    #[serde(rename = "chunkSize", default)]
    pub chunk_size: Option<usize>,
    #[serde(rename = "chunkCount", default)]
    pub chunk_count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobCredentials {
    #[serde(flatten)]
    pub provider: ProviderCredentials,
    #[serde(rename = "deploymentName")]
    pub deployment_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_temperature() -> f64 {
    0.7
}

impl JobDescription {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let description: Self = serde_json::from_str(raw)
            .map_err(|e| PipelineError::configuration(format!("invalid JSON in description: {e}")))?;
        if description.prompt.trim().is_empty() {
            return Err(PipelineError::configuration("prompt must not be empty"));
        }
        if description.credentials.deployment_name.trim().is_empty() {
            return Err(PipelineError::configuration("deploymentName must not be empty"));
        }
        Ok(description)
    }

    pub fn template(&self) -> PromptTemplate {
        PromptTemplate::new(self.prompt.clone(), self.placeholder_field.clone())
    }

    pub fn chunk_plan(&self) -> Result<ChunkPlan, PipelineError> {
        Ok(ChunkPlan::from_config(
            self.config.chunk_size,
            self.config.chunk_count,
        )?)
    }

    pub fn unique_id_field(&self) -> Option<&str> {
        self.unique_id_field.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"{
        "job_title": "Keywords",
        "prompt": "Suggest keywords for {{category}}",
        "placeholder_field": {"category": "category_name"},
        "unique_id_field": null,
        "output_field": {"five_keywords": "list of 5 keywords"},
        "config": {"chunkSize": 20},
        "credentials": {
            "apiKey": "secret",
            "endpoint": "https://example.openai.azure.com/",
            "deploymentName": "gpt-4o-batch",
            "temperature": 0.3
        }
    }"#;

    #[test]
    fn parses_submission_payload() {
        let d = JobDescription::parse(DESCRIPTION).unwrap();
        assert_eq!(d.job_title, "Keywords");
        assert_eq!(d.unique_id_field(), None);
        assert_eq!(d.placeholder_field["category"], "category_name");
        assert_eq!(d.credentials.provider.api_key, "secret");
        assert_eq!(d.credentials.deployment_name, "gpt-4o-batch");
        assert_eq!(d.credentials.temperature, 0.3);
        assert_eq!(d.chunk_plan().unwrap(), ChunkPlan::Size(20));
    }

    #[test]
    fn malformed_payload_is_a_configuration_error() {
        let err = JobDescription::parse("{not json").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn terminal_statuses() {
        assert!(is_terminal("completed"));
        assert!(is_terminal("failed"));
        assert!(!is_terminal("in_progress"));
        assert!(!is_terminal(STATUS_INVALID_BATCH_ID));
    }
}
