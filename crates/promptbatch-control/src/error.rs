use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use promptbatch_dataset::DatasetError;
use serde::Serialize;
use thiserror::Error;

use crate::history::StoreError;
use crate::provider::ProviderError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

pub fn json_error(code: StatusCode, message: impl Into<String>) -> Response {
    (
        code,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Configuration(String),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::BAD_REQUEST,
            Self::Dataset(DatasetError::Encode(_) | DatasetError::Csv(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Dataset(_) => StatusCode::BAD_REQUEST,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        if code.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        json_error(code, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_status_codes() {
        let cases = [
            (PipelineError::configuration("bad"), StatusCode::BAD_REQUEST),
            (
                DatasetError::UnsupportedFileType("a.txt".to_string()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                ProviderError::Status {
                    status: 500,
                    body: String::new(),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (PipelineError::NotFound("job".to_string()), StatusCode::NOT_FOUND),
        ];
        for (err, code) in cases {
            assert_eq!(err.status_code(), code, "{err}");
        }
    }
}
