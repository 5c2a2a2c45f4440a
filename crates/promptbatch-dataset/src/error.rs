use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("failed to read dataset: {0}")]
    Read(String),
    #[error("failed to encode request line: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write csv: {0}")]
    Csv(#[from] csv::Error),
}

impl DatasetError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, DatasetError>;
