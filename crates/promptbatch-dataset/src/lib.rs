//! Dataset handling for prompt batches: loading uploads, building per-row
//! prompts, chunking, the batch JSONL codec and result tables.

pub mod chunk;
pub mod dataset;
pub mod error;
pub mod jsonl;
pub mod load;
pub mod materialize;
pub mod summary;
pub mod transform;

pub use chunk::{ChunkPlan, split_by_size, split_into_chunks};
pub use dataset::{Dataset, Row};
pub use error::{DatasetError, Result};
pub use load::load_dataset;
pub use summary::{TableExport, TokenCosts, UsageSummary};
pub use transform::{PromptTemplate, Transformed, transform};
