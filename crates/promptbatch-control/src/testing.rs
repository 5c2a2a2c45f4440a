//! Shared fixtures: an in-memory store and a scripted provider.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use promptbatch_dataset::jsonl::ChatMessage;
use promptbatch_dataset::materialize::ResponseBody;
use sea_orm_migration::MigratorTrait;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::history::{
    BATCH_NOT_STARTED, BatchFile, BatchJob, FILE_STATUS_PROCESSED, JOB_TYPE_BATCH,
    SeaOrmHistoryStore, UploadedFile,
};
use crate::provider::{
    BatchObject, BatchProvider, FileObject, ProviderConnector, ProviderCredentials, ProviderError,
    RetryPolicy,
};
use crate::state::AppState;

pub async fn memory_store() -> SeaOrmHistoryStore {
    let db = promptbatch_db::connect("sqlite::memory:").await.unwrap();
    promptbatch_migration::Migrator::up(&db, None).await.unwrap();
    SeaOrmHistoryStore::new(db)
}

pub async fn test_state(provider: FakeProvider) -> AppState {
    let config = AppConfig {
        database_url: "sqlite::memory:".to_string(),
        chat_retry: RetryPolicy {
            attempts: 2,
            delay: Duration::ZERO,
        },
        test_workers: 3,
        ..AppConfig::default()
    };
    AppState {
        store: Arc::new(memory_store().await),
        connector: Arc::new(FakeConnector { provider }),
        config: Arc::new(config),
    }
}

pub fn sample_job(user_id: &str) -> BatchJob {
    let now = Utc::now();
    BatchJob {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        job_title: "Keywords".to_string(),
        file_name: "rows.csv".to_string(),
        job_type: JOB_TYPE_BATCH.to_string(),
        chunks: 2,
        chunk_size: 20,
        total_rows_processed: 40,
        model: "gpt-4o-batch".to_string(),
        endpoint: "https://example.openai.azure.com".to_string(),
        api_key: "secret".to_string(),
        prompt: vec!["Suggest keywords for {{category}}".to_string()],
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

pub fn sample_upload(job: &BatchJob, file_id: Option<&str>, chunk_no: &str) -> UploadedFile {
    let now = Utc::now();
    UploadedFile {
        id: Uuid::new_v4(),
        file_id: file_id.map(str::to_string),
        user_id: job.user_id.clone(),
        job_id: job.id,
        job_type: JOB_TYPE_BATCH.to_string(),
        file_status: FILE_STATUS_PROCESSED.to_string(),
        batch_status: BATCH_NOT_STARTED.to_string(),
        chunk_no: chunk_no.to_string(),
        total_rows_processed: 20,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

pub fn sample_batch_file(job: &BatchJob, batch_id: &str, file_id: &str, status: &str) -> BatchFile {
    let now = Utc::now();
    BatchFile {
        batch_id: batch_id.to_string(),
        user_id: job.user_id.clone(),
        job_id: job.id,
        file_id: file_id.to_string(),
        output_file_id: None,
        job_type: JOB_TYPE_BATCH.to_string(),
        status: status.to_string(),
        chunk_no: "chunk_1".to_string(),
        total_rows_processed: 20,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

/// `n` distinct rows with `name` and `category_name` columns and no id column.
pub fn rows_csv(n: usize) -> String {
    let mut out = String::from("name,category_name\n");
    for i in 1..=n {
        out.push_str(&format!("item {i},category {i}\n"));
    }
    out
}

pub fn description_json(config: Value) -> String {
    json!({
        "job_title": "Keywords",
        "prompt": "Suggest keywords for {{category}} ({{ name }})",
        "placeholder_field": {"category": "category_name", "name": "name"},
        "unique_id_field": null,
        "output_field": {},
        "config": config,
        "credentials": {
            "apiKey": "secret",
            "endpoint": "https://example.openai.azure.com/",
            "deploymentName": "gpt-4o-batch",
            "temperature": 0.5
        }
    })
    .to_string()
}

#[derive(Default)]
struct Script {
    upload_calls: usize,
    failing_upload: Option<usize>,
    uploaded_file_status: Option<String>,
    uploads: Vec<Vec<u8>>,
    files: HashMap<String, Vec<u8>>,
    batches: HashMap<String, BatchObject>,
    failing_creates: HashSet<String>,
    create_calls: usize,
    retrieve_batch_calls: usize,
    failing_chats: Vec<String>,
    chat_calls: usize,
}

/// In-process stand-in for the provider. Clones share one script.
#[derive(Clone, Default)]
pub struct FakeProvider {
    script: Arc<Mutex<Script>>,
}

fn status_error(status: u16, body: &str) -> ProviderError {
    ProviderError::Status {
        status,
        body: body.to_string(),
    }
}

impl FakeProvider {
    /// Makes the `n`-th upload (1-based) fail.
    pub fn fail_upload_number(&self, n: usize) {
        self.script.lock().unwrap().failing_upload = Some(n);
    }

    pub fn set_uploaded_file_status(&self, status: &str) {
        self.script.lock().unwrap().uploaded_file_status = Some(status.to_string());
    }

    pub fn uploaded_contents(&self) -> Vec<Vec<u8>> {
        self.script.lock().unwrap().uploads.clone()
    }

    pub fn put_file(&self, file_id: &str, content: impl Into<Vec<u8>>) {
        self.script
            .lock()
            .unwrap()
            .files
            .insert(file_id.to_string(), content.into());
    }

    pub fn set_batch(&self, batch_id: &str, status: &str, output_file_id: Option<&str>) {
        self.script.lock().unwrap().batches.insert(
            batch_id.to_string(),
            BatchObject {
                id: batch_id.to_string(),
                status: status.to_string(),
                output_file_id: output_file_id.map(str::to_string),
            },
        );
    }

    pub fn fail_create_for(&self, file_id: &str) {
        self.script
            .lock()
            .unwrap()
            .failing_creates
            .insert(file_id.to_string());
    }

    pub fn fail_chat_containing(&self, needle: &str) {
        self.script
            .lock()
            .unwrap()
            .failing_chats
            .push(needle.to_string());
    }

    pub fn create_calls(&self) -> usize {
        self.script.lock().unwrap().create_calls
    }

    pub fn retrieve_batch_calls(&self) -> usize {
        self.script.lock().unwrap().retrieve_batch_calls
    }

    pub fn chat_calls(&self) -> usize {
        self.script.lock().unwrap().chat_calls
    }
}

#[async_trait::async_trait]
impl BatchProvider for FakeProvider {
    async fn upload_batch_file(
        &self,
        _file_name: &str,
        content: Vec<u8>,
    ) -> Result<FileObject, ProviderError> {
        let mut script = self.script.lock().unwrap();
        script.upload_calls += 1;
        if script.failing_upload == Some(script.upload_calls) {
            return Err(status_error(500, "upload rejected"));
        }
        let id = format!("file-{}", script.upload_calls);
        script.uploads.push(content.clone());
        script.files.insert(id.clone(), content);
        Ok(FileObject {
            id,
            status: "uploaded".to_string(),
        })
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, ProviderError> {
        let script = self.script.lock().unwrap();
        if !script.files.contains_key(file_id) {
            return Err(status_error(404, "no such file"));
        }
        Ok(FileObject {
            id: file_id.to_string(),
            status: script
                .uploaded_file_status
                .clone()
                .unwrap_or_else(|| "processed".to_string()),
        })
    }

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>, ProviderError> {
        self.script
            .lock()
            .unwrap()
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| status_error(404, "no such file"))
    }

    async fn create_batch(&self, input_file_id: &str) -> Result<BatchObject, ProviderError> {
        let mut script = self.script.lock().unwrap();
        script.create_calls += 1;
        if script.failing_creates.contains(input_file_id) {
            return Err(status_error(400, "invalid input file"));
        }
        let batch = BatchObject {
            id: format!("batch-{}", script.create_calls),
            status: "validating".to_string(),
            output_file_id: None,
        };
        script.batches.insert(batch.id.clone(), batch.clone());
        Ok(batch)
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchObject, ProviderError> {
        let mut script = self.script.lock().unwrap();
        script.retrieve_batch_calls += 1;
        script
            .batches
            .get(batch_id)
            .cloned()
            .ok_or_else(|| status_error(404, "no such batch"))
    }

    async fn chat_completion(
        &self,
        deployment: &str,
        messages: &[ChatMessage],
        _temperature: f64,
    ) -> Result<ResponseBody, ProviderError> {
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        {
            let mut script = self.script.lock().unwrap();
            script.chat_calls += 1;
            if script.failing_chats.iter().any(|n| prompt.contains(n.as_str())) {
                return Err(status_error(500, "model unavailable"));
            }
        }
        let content = json!({ "echo": prompt }).to_string();
        Ok(serde_json::from_value(json!({
            "model": deployment,
            "choices": [{"message": {"content": content}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap())
    }
}

pub struct FakeConnector {
    pub provider: FakeProvider,
}

impl ProviderConnector for FakeConnector {
    fn connect(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<Arc<dyn BatchProvider>, ProviderError> {
        if credentials.api_key.trim().is_empty() {
            return Err(ProviderError::Credentials("api key is empty".to_string()));
        }
        Ok(Arc::new(self.provider.clone()))
    }
}
