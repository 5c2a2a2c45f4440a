use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{DatasetError, Result};

/// Splits `dataset` into exactly `chunk_count` contiguous chunks.
///
/// Each chunk holds `len / chunk_count` rows; the last one also takes the
/// remainder. When `chunk_count` exceeds the row count the leading chunks are empty.
pub fn split_into_chunks(dataset: &Dataset, chunk_count: usize) -> Result<Vec<Dataset>> {
    if chunk_count == 0 {
        return Err(DatasetError::configuration("chunk count must be at least 1"));
    }

    let total = dataset.len();
    let base = total / chunk_count;
    let mut chunks = Vec::with_capacity(chunk_count);
    for i in 0..chunk_count {
        let start = i * base;
        let end = if i + 1 == chunk_count { total } else { start + base };
        chunks.push(dataset.slice(start..end));
    }
    Ok(chunks)
}

/// Splits `dataset` into consecutive chunks of `chunk_size` rows; the last may be shorter.
pub fn split_by_size(dataset: &Dataset, chunk_size: usize) -> Result<Vec<Dataset>> {
    if chunk_size == 0 {
        return Err(DatasetError::configuration("chunk size must be at least 1"));
    }

    let total = dataset.len();
    let chunks = (0..total)
        .step_by(chunk_size)
        .map(|start| dataset.slice(start..start + chunk_size))
        .collect();
    Ok(chunks)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkPlan {
    /// Fixed number of chunks.
    Count(usize),
    /// Fixed number of rows per chunk.
    Size(usize),
}

impl ChunkPlan {
    /// `chunk_count` wins over `chunk_size` when both are given.
    pub fn from_config(chunk_size: Option<usize>, chunk_count: Option<usize>) -> Result<Self> {
        match (chunk_count, chunk_size) {
            (Some(count), _) => Ok(Self::Count(count)),
            (None, Some(size)) => Ok(Self::Size(size)),
            (None, None) => Err(DatasetError::configuration(
                "config must provide chunkSize or chunkCount",
            )),
        }
    }

    /// Chunks for upload. Never yields an empty chunk for a non-empty dataset.
    pub fn split(self, dataset: &Dataset) -> Result<Vec<Dataset>> {
        match self {
            Self::Count(0) | Self::Size(0) => Err(DatasetError::configuration(
                "chunk size and count must be at least 1",
            )),
            Self::Count(count) => split_into_chunks(dataset, count.min(dataset.len()).max(1)),
            Self::Size(size) => split_by_size(dataset, size),
        }
    }

    /// Rows per chunk as recorded on the job (the last chunk may differ).
    pub fn rows_per_chunk(self, total_rows: usize) -> usize {
        match self {
            Self::Size(size) => size,
            Self::Count(count) => total_rows / count.min(total_rows).max(1),
        }
    }
}
