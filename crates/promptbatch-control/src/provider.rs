use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use promptbatch_dataset::jsonl::{CHAT_COMPLETIONS_URL, ChatMessage};
use promptbatch_dataset::materialize::ResponseBody;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const COMPLETION_WINDOW: &str = "24h";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid provider credentials: {0}")]
    Credentials(String),
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Endpoint and key of one Azure OpenAI resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderCredentials {
    pub endpoint: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

impl FileObject {
    pub fn is_processed(&self) -> bool {
        self.status.eq_ignore_ascii_case("processed")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchObject {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output_file_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateBatchRequest<'a> {
    input_file_id: &'a str,
    endpoint: &'a str,
    completion_window: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f64,
}

/// The remote batch API, scoped to one set of credentials.
#[async_trait::async_trait]
pub trait BatchProvider: Send + Sync {
    async fn upload_batch_file(&self, file_name: &str, content: Vec<u8>)
    -> Result<FileObject, ProviderError>;
    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, ProviderError>;
    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>, ProviderError>;
    async fn create_batch(&self, input_file_id: &str) -> Result<BatchObject, ProviderError>;
    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchObject, ProviderError>;
    async fn chat_completion(
        &self,
        deployment: &str,
        messages: &[ChatMessage],
        temperature: f64,
    ) -> Result<ResponseBody, ProviderError>;
}

/// Builds a [`BatchProvider`] for a job's credentials.
pub trait ProviderConnector: Send + Sync {
    fn connect(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<Arc<dyn BatchProvider>, ProviderError>;
}

pub struct AzureConnector {
    http: reqwest::Client,
    api_version: String,
    chat_api_version: String,
}

impl AzureConnector {
    pub fn new(
        timeout: Duration,
        api_version: impl Into<String>,
        chat_api_version: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .user_agent("promptbatch-control")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_version: api_version.into(),
            chat_api_version: chat_api_version.into(),
        })
    }
}

impl ProviderConnector for AzureConnector {
    fn connect(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<Arc<dyn BatchProvider>, ProviderError> {
        let base = credentials.endpoint.trim().trim_end_matches('/');
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(ProviderError::Credentials(format!(
                "endpoint must be an http(s) URL, got {:?}",
                credentials.endpoint
            )));
        }
        if credentials.api_key.trim().is_empty() {
            return Err(ProviderError::Credentials("api key is empty".to_string()));
        }

        Ok(Arc::new(AzureOpenAiClient {
            http: self.http.clone(),
            base_url: base.to_string(),
            api_key: credentials.api_key.trim().to_string(),
            api_version: self.api_version.clone(),
            chat_api_version: self.chat_api_version.clone(),
        }))
    }
}

/// Azure OpenAI REST client (`api-key` header, `api-version` query).
pub struct AzureOpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_version: String,
    chat_api_version: String,
}

impl AzureOpenAiClient {
    fn url(&self, path: &str) -> String {
        format!("{}/openai/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("api-key", &self.api_key)
            .query(&[("api-version", self.api_version.as_str())])
    }
}

async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn send_json<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T, ProviderError> {
    let resp = checked(req.send().await?).await?;
    Ok(resp.json::<T>().await?)
}

#[async_trait::async_trait]
impl BatchProvider for AzureOpenAiClient {
    async fn upload_batch_file(
        &self,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<FileObject, ProviderError> {
        let part = Part::bytes(content)
            .file_name(file_name.to_string())
            .mime_str("application/jsonl")?;
        let form = Form::new().text("purpose", "batch").part("file", part);
        send_json(self.request(reqwest::Method::POST, "files").multipart(form)).await
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, ProviderError> {
        send_json(self.request(reqwest::Method::GET, &format!("files/{file_id}"))).await
    }

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>, ProviderError> {
        let req = self.request(reqwest::Method::GET, &format!("files/{file_id}/content"));
        let resp = checked(req.send().await?).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn create_batch(&self, input_file_id: &str) -> Result<BatchObject, ProviderError> {
        let body = CreateBatchRequest {
            input_file_id,
            endpoint: CHAT_COMPLETIONS_URL,
            completion_window: COMPLETION_WINDOW,
        };
        send_json(self.request(reqwest::Method::POST, "batches").json(&body)).await
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchObject, ProviderError> {
        send_json(self.request(reqwest::Method::GET, &format!("batches/{batch_id}"))).await
    }

    async fn chat_completion(
        &self,
        deployment: &str,
        messages: &[ChatMessage],
        temperature: f64,
    ) -> Result<ResponseBody, ProviderError> {
        let req = self
            .http
            .post(self.url(&format!("deployments/{deployment}/chat/completions")))
            .header("api-key", &self.api_key)
            .query(&[("api-version", self.chat_api_version.as_str())])
            .json(&ChatRequest {
                messages,
                temperature,
            });
        send_json(req).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

/// Runs `op` up to `policy.attempts` times with a fixed delay, returning the last error.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) if attempt < attempts => {
                tracing::warn!(attempt, attempts, error = %err, "provider call failed, retrying");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::ZERO,
        }
    }

    fn failure() -> ProviderError {
        ProviderError::Status {
            status: 429,
            body: "slow down".to_string(),
        }
    }

    #[tokio::test]
    async fn retry_stops_on_first_success() {
        let calls = AtomicU32::new(0);
        let out = with_retry(policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n == 0 { Err(failure()) } else { Ok(n) } }
        })
        .await
        .unwrap();
        assert_eq!(out, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_returns_last_error() {
        let calls = AtomicU32::new(0);
        let err = with_retry(policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(failure()) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 429, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn connector_rejects_bad_credentials() {
        let connector =
            AzureConnector::new(Duration::from_secs(5), "2025-01-01-preview", "2024-05-01-preview")
                .unwrap();
        let bad_endpoint = ProviderCredentials {
            endpoint: "not-a-url".to_string(),
            api_key: "k".to_string(),
        };
        assert!(matches!(
            connector.connect(&bad_endpoint),
            Err(ProviderError::Credentials(_))
        ));

        let no_key = ProviderCredentials {
            endpoint: "https://example.openai.azure.com/".to_string(),
            api_key: " ".to_string(),
        };
        assert!(matches!(
            connector.connect(&no_key),
            Err(ProviderError::Credentials(_))
        ));
    }

    #[test]
    fn processed_status_is_case_insensitive() {
        let file = FileObject {
            id: "file-1".to_string(),
            status: "Processed".to_string(),
        };
        assert!(file.is_processed());
    }
}
