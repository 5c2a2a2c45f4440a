pub mod batch;
pub mod history;
pub mod test_job;

use axum::extract::{DefaultBodyLimit, Multipart};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::JobDescription;
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct JobQuery {
    pub user_id: String,
    pub job_id: Uuid,
}

/// A payload with a human-readable `message` next to its fields.
#[derive(Debug, Serialize)]
pub struct WithMessage<T> {
    pub message: String,
    #[serde(flatten)]
    pub body: T,
}

impl<T> WithMessage<T> {
    pub fn new(message: impl Into<String>, body: T) -> Json<Self> {
        Json(Self {
            message: message.into(),
            body,
        })
    }
}

#[derive(Debug, Serialize)]
struct Healthz {
    status: &'static str,
    version: &'static str,
}

async fn healthz() -> Json<Healthz> {
    Json(Healthz {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// A dataset upload: multipart `file` plus the JSON `description` field.
pub struct Submission {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub description: JobDescription,
}

fn multipart_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::configuration(format!("invalid multipart body: {e}"))
}

pub async fn read_submission(mut multipart: Multipart) -> Result<Submission, PipelineError> {
    let mut file = None;
    let mut description = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("description") => {
                description = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| PipelineError::configuration("missing multipart field 'file'"))?;
    let description = description
        .ok_or_else(|| PipelineError::configuration("missing multipart field 'description'"))?;
    Ok(Submission {
        file_name,
        bytes,
        description: JobDescription::parse(&description)?,
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/batch/process/create-upload-file",
            post(batch::create_upload_file),
        )
        .route(
            "/batch/process/create-start-batch",
            post(batch::create_start_batch),
        )
        .route(
            "/batch/process/start-batch-of-job",
            post(batch::start_batch_of_job),
        )
        .route(
            "/batch/process/check-batch-status",
            post(batch::check_batch_status),
        )
        .route("/batch/download/input-file", post(batch::download_input_file))
        .route("/batch/download/output-file", post(batch::download_output_file))
        .route("/history/batch-job", get(history::list_batch_jobs))
        .route("/history/uploaded-file", get(history::list_uploaded_files))
        .route("/history/batch-file", get(history::list_batch_files))
        .route("/history/test-job", get(history::list_test_jobs))
        .route("/delete/batch-job", delete(history::delete_batch_job))
        .route("/delete/uploaded-file", delete(history::delete_uploaded_file))
        .route("/delete/batch-file", delete(history::delete_batch_file))
        .route("/delete/test-job", delete(history::delete_test_job))
        .route("/test-job/process/test-prompt", post(test_job::test_prompt))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, description_json, rows_csv, sample_job, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const BOUNDARY: &str = "promptbatch-test-boundary";

    fn multipart_body(file_name: &str, file: &str, description: &str) -> String {
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {file}\r\n\
             --{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"description\"\r\n\r\n\
             {description}\r\n\
             --{BOUNDARY}--\r\n"
        )
    }

    fn multipart_request(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let app = router(test_state(FakeProvider::default()).await);
        let (status, body) = send(&app, empty_request("GET", "/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn upload_then_launch_then_check() {
        let app = router(test_state(FakeProvider::default()).await);
        let description = description_json(json!({"chunkSize": 20}));

        let (status, body) = send(
            &app,
            multipart_request(
                "/batch/process/create-upload-file?user_id=u1",
                multipart_body("rows.csv", &rows_csv(45), &description),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["message"], "Data pre-processing and upload done");
        assert_eq!(body["chunks"], 3);
        assert_eq!(body["total_rows_processed"], 45);
        let job_id = body["job_id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            empty_request(
                "POST",
                &format!("/batch/process/start-batch-of-job?user_id=u1&job_id={job_id}"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let batches = body["batches"].as_array().unwrap();
        assert_eq!(batches.len(), 3);
        let batch_ids: Vec<Value> = batches.iter().map(|b| b["batch_id"].clone()).collect();

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                &format!("/batch/process/check-batch-status?user_id=u1&job_id={job_id}"),
                json!({"batch_ids": batch_ids}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(
            body["batches"]
                .as_array()
                .unwrap()
                .iter()
                .all(|b| b["status"] == "validating")
        );

        let (status, body) = send(
            &app,
            empty_request("GET", &format!("/history/uploaded-file?user_id=u1&job_id={job_id}")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_files"], 3);
    }

    #[tokio::test]
    async fn unsupported_dataset_is_bad_request() {
        let app = router(test_state(FakeProvider::default()).await);
        let description = description_json(json!({"chunkSize": 20}));
        let (status, body) = send(
            &app,
            multipart_request(
                "/batch/process/create-upload-file?user_id=u1",
                multipart_body("rows.txt", "a,b\n1,2\n", &description),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("rows.txt"));
    }

    #[tokio::test]
    async fn malformed_description_is_bad_request() {
        let app = router(test_state(FakeProvider::default()).await);
        let (status, body) = send(
            &app,
            multipart_request(
                "/test-job/process/test-prompt?user_id=u1",
                multipart_body("rows.csv", &rows_csv(2), "{oops"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("invalid JSON"));
    }

    #[tokio::test]
    async fn empty_history_is_not_found() {
        let app = router(test_state(FakeProvider::default()).await);
        let (status, body) = send(&app, empty_request("GET", "/history/batch-job?user_id=u1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].is_string());

        let (status, _) = send(&app, empty_request("GET", "/history/test-job?user_id=u1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_twice_reports_already_deleted() {
        let state = test_state(FakeProvider::default()).await;
        let job = sample_job("u1");
        state.store.upsert_batch_job(&job).await.unwrap();
        let app = router(state);
        let uri = format!("/delete/batch-job?user_id=u1&job_id={}", job.id);

        let (status, _) = send(&app, empty_request("GET", "/history/batch-job?user_id=u1")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, empty_request("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, empty_request("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("already deleted"));

        let (status, _) = send(
            &app,
            empty_request("DELETE", &format!("/delete/batch-job?user_id=u2&job_id={}", job.id)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_prompt_route_reports_usage() {
        let app = router(test_state(FakeProvider::default()).await);
        let description = description_json(json!({"chunkSize": 4}));
        let (status, body) = send(
            &app,
            multipart_request(
                "/test-job/process/test-prompt?user_id=u1",
                multipart_body("rows.csv", &rows_csv(6), &description),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["total_rows_processed"], 4);
        assert_eq!(body["average_total_token"], 15.0);
        assert_eq!(body["job_title"], "Keywords");
        assert!(body["file_data"].as_str().is_some_and(|s| !s.is_empty()));
    }
}
