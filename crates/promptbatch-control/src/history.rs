use chrono::{DateTime, FixedOffset, Utc};
use promptbatch_db::entities::{batch_files, batch_jobs, test_jobs, uploaded_files};
use sea_orm::prelude::Expr;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub const JOB_TYPE_BATCH: &str = "batch";
pub const JOB_TYPE_TEST: &str = "test";

pub const FILE_STATUS_PROCESSED: &str = "processed";
pub const FILE_STATUS_FAILED: &str = "failed";
pub const BATCH_NOT_STARTED: &str = "not_started";
pub const BATCH_STARTED: &str = "started";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error("corrupt history row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftDeleteOutcome {
    Deleted,
    AlreadyDeleted,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchJob {
    pub id: Uuid,
    pub user_id: String,
    pub job_title: String,
    pub file_name: String,
    pub job_type: String,
    pub chunks: i32,
    pub chunk_size: i32,
    pub total_rows_processed: i64,
    pub model: String,
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub prompt: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One uploaded chunk file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedFile {
    pub id: Uuid,
    pub file_id: Option<String>,
    pub user_id: String,
    pub job_id: Uuid,
    pub job_type: String,
    pub file_status: String,
    pub batch_status: String,
    pub chunk_no: String,
    pub total_rows_processed: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One provider batch launched from an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFile {
    pub batch_id: String,
    pub user_id: String,
    pub job_id: Uuid,
    pub file_id: String,
    pub output_file_id: Option<String>,
    pub job_type: String,
    pub status: String,
    pub chunk_no: String,
    pub total_rows_processed: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestJob {
    pub id: Uuid,
    pub user_id: String,
    pub job_title: String,
    pub file_name: String,
    pub job_type: String,
    pub status: String,
    pub total_rows_processed: i64,
    pub model: String,
    pub avg_input_token: f64,
    pub avg_completion_token: f64,
    pub avg_total_token: f64,
    pub avg_cost_per_row: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Row-scoped access to job history. Reads only see live (not soft-deleted) rows.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    async fn find_batch_job(&self, user_id: &str, job_id: Uuid) -> StoreResult<Option<BatchJob>>;
    async fn list_batch_jobs(&self, user_id: &str) -> StoreResult<Vec<BatchJob>>;
    async fn upsert_batch_job(&self, job: &BatchJob) -> StoreResult<()>;
    async fn soft_delete_batch_job(
        &self,
        user_id: &str,
        job_id: Uuid,
    ) -> StoreResult<SoftDeleteOutcome>;

    async fn find_uploaded_file(
        &self,
        user_id: &str,
        job_id: Uuid,
        file_id: &str,
    ) -> StoreResult<Option<UploadedFile>>;
    async fn list_uploaded_files(&self, user_id: &str, job_id: Uuid)
    -> StoreResult<Vec<UploadedFile>>;
    async fn upsert_uploaded_file(&self, file: &UploadedFile) -> StoreResult<()>;
    async fn soft_delete_uploaded_file(
        &self,
        user_id: &str,
        file_id: &str,
    ) -> StoreResult<SoftDeleteOutcome>;

    async fn find_batch_file(
        &self,
        user_id: &str,
        job_id: Uuid,
        batch_id: &str,
    ) -> StoreResult<Option<BatchFile>>;
    async fn list_batch_files(&self, user_id: &str, job_id: Uuid) -> StoreResult<Vec<BatchFile>>;
    async fn upsert_batch_file(&self, file: &BatchFile) -> StoreResult<()>;
    async fn soft_delete_batch_file(
        &self,
        user_id: &str,
        batch_id: &str,
    ) -> StoreResult<SoftDeleteOutcome>;

    async fn list_test_jobs(&self, user_id: &str) -> StoreResult<Vec<TestJob>>;
    async fn upsert_test_job(&self, job: &TestJob) -> StoreResult<()>;
    async fn soft_delete_test_job(
        &self,
        user_id: &str,
        job_id: Uuid,
    ) -> StoreResult<SoftDeleteOutcome>;
}

pub struct SeaOrmHistoryStore {
    db: DatabaseConnection,
}

impl SeaOrmHistoryStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn utc(ts: DateTime<FixedOffset>) -> DateTime<Utc> {
    ts.with_timezone(&Utc)
}

fn fixed(ts: DateTime<Utc>) -> DateTime<FixedOffset> {
    ts.into()
}

fn batch_job_from_model(m: batch_jobs::Model) -> StoreResult<BatchJob> {
    let prompt: Vec<String> = serde_json::from_str(&m.prompt_json)
        .map_err(|e| StoreError::Corrupt(format!("batch job {} prompt: {e}", m.id)))?;
    Ok(BatchJob {
        id: m.id,
        user_id: m.user_id,
        job_title: m.job_title,
        file_name: m.file_name,
        job_type: m.job_type,
        chunks: m.chunks,
        chunk_size: m.chunk_size,
        total_rows_processed: m.total_rows_processed,
        model: m.model,
        endpoint: m.endpoint,
        api_key: m.api_key,
        prompt,
        created_at: utc(m.created_at),
        updated_at: utc(m.updated_at),
        deleted_at: m.deleted_at.map(utc),
    })
}

fn uploaded_file_from_model(m: uploaded_files::Model) -> UploadedFile {
    UploadedFile {
        id: m.id,
        file_id: m.file_id,
        user_id: m.user_id,
        job_id: m.job_id,
        job_type: m.job_type,
        file_status: m.file_status,
        batch_status: m.batch_status,
        chunk_no: m.chunk_no,
        total_rows_processed: m.total_rows_processed,
        created_at: utc(m.created_at),
        updated_at: utc(m.updated_at),
        deleted_at: m.deleted_at.map(utc),
    }
}

fn batch_file_from_model(m: batch_files::Model) -> BatchFile {
    BatchFile {
        batch_id: m.batch_id,
        user_id: m.user_id,
        job_id: m.job_id,
        file_id: m.file_id,
        output_file_id: m.output_file_id,
        job_type: m.job_type,
        status: m.status,
        chunk_no: m.chunk_no,
        total_rows_processed: m.total_rows_processed,
        created_at: utc(m.created_at),
        updated_at: utc(m.updated_at),
        deleted_at: m.deleted_at.map(utc),
    }
}

fn test_job_from_model(m: test_jobs::Model) -> TestJob {
    TestJob {
        id: m.id,
        user_id: m.user_id,
        job_title: m.job_title,
        file_name: m.file_name,
        job_type: m.job_type,
        status: m.status,
        total_rows_processed: m.total_rows_processed,
        model: m.model,
        avg_input_token: m.avg_input_token,
        avg_completion_token: m.avg_completion_token,
        avg_total_token: m.avg_total_token,
        avg_cost_per_row: m.avg_cost_per_row,
        created_at: utc(m.created_at),
        updated_at: utc(m.updated_at),
        deleted_at: m.deleted_at.map(utc),
    }
}

/// Soft-delete outcome for `rows`, every match including already-deleted ones.
fn delete_outcome<T>(rows: &[T], deleted_at: impl Fn(&T) -> bool) -> SoftDeleteOutcome {
    if rows.is_empty() {
        SoftDeleteOutcome::NotFound
    } else if rows.iter().all(deleted_at) {
        SoftDeleteOutcome::AlreadyDeleted
    } else {
        SoftDeleteOutcome::Deleted
    }
}

#[async_trait::async_trait]
impl HistoryStore for SeaOrmHistoryStore {
    async fn find_batch_job(&self, user_id: &str, job_id: Uuid) -> StoreResult<Option<BatchJob>> {
        batch_jobs::Entity::find_by_id(job_id)
            .filter(batch_jobs::Column::UserId.eq(user_id))
            .filter(batch_jobs::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .map(batch_job_from_model)
            .transpose()
    }

    async fn list_batch_jobs(&self, user_id: &str) -> StoreResult<Vec<BatchJob>> {
        batch_jobs::Entity::find()
            .filter(batch_jobs::Column::UserId.eq(user_id))
            .filter(batch_jobs::Column::DeletedAt.is_null())
            .order_by_desc(batch_jobs::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(batch_job_from_model)
            .collect()
    }

    async fn upsert_batch_job(&self, job: &BatchJob) -> StoreResult<()> {
        let prompt_json = serde_json::to_string(&job.prompt)
            .map_err(|e| StoreError::Corrupt(format!("batch job {} prompt: {e}", job.id)))?;
        let model = batch_jobs::ActiveModel {
            id: Set(job.id),
            user_id: Set(job.user_id.clone()),
            job_title: Set(job.job_title.clone()),
            file_name: Set(job.file_name.clone()),
            job_type: Set(job.job_type.clone()),
            chunks: Set(job.chunks),
            chunk_size: Set(job.chunk_size),
            total_rows_processed: Set(job.total_rows_processed),
            model: Set(job.model.clone()),
            endpoint: Set(job.endpoint.clone()),
            api_key: Set(job.api_key.clone()),
            prompt_json: Set(prompt_json),
            created_at: Set(fixed(job.created_at)),
            updated_at: Set(fixed(job.updated_at)),
            deleted_at: Set(job.deleted_at.map(fixed)),
        };
        batch_jobs::Entity::insert(model)
            .on_conflict(
                OnConflict::column(batch_jobs::Column::Id)
                    .update_columns([
                        batch_jobs::Column::JobTitle,
                        batch_jobs::Column::FileName,
                        batch_jobs::Column::Chunks,
                        batch_jobs::Column::ChunkSize,
                        batch_jobs::Column::TotalRowsProcessed,
                        batch_jobs::Column::Model,
                        batch_jobs::Column::Endpoint,
                        batch_jobs::Column::ApiKey,
                        batch_jobs::Column::PromptJson,
                        batch_jobs::Column::UpdatedAt,
                        batch_jobs::Column::DeletedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn soft_delete_batch_job(
        &self,
        user_id: &str,
        job_id: Uuid,
    ) -> StoreResult<SoftDeleteOutcome> {
        let rows = batch_jobs::Entity::find_by_id(job_id)
            .filter(batch_jobs::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?;
        let outcome = delete_outcome(&rows, |r| r.deleted_at.is_some());
        if outcome == SoftDeleteOutcome::Deleted {
            let now = fixed(Utc::now());
            batch_jobs::Entity::update_many()
                .col_expr(batch_jobs::Column::DeletedAt, Expr::value(now))
                .col_expr(batch_jobs::Column::UpdatedAt, Expr::value(now))
                .filter(batch_jobs::Column::Id.eq(job_id))
                .filter(batch_jobs::Column::UserId.eq(user_id))
                .filter(batch_jobs::Column::DeletedAt.is_null())
                .exec(&self.db)
                .await?;
        }
        Ok(outcome)
    }

    async fn find_uploaded_file(
        &self,
        user_id: &str,
        job_id: Uuid,
        file_id: &str,
    ) -> StoreResult<Option<UploadedFile>> {
        Ok(uploaded_files::Entity::find()
            .filter(uploaded_files::Column::UserId.eq(user_id))
            .filter(uploaded_files::Column::JobId.eq(job_id))
            .filter(uploaded_files::Column::FileId.eq(file_id))
            .filter(uploaded_files::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .map(uploaded_file_from_model))
    }

    async fn list_uploaded_files(
        &self,
        user_id: &str,
        job_id: Uuid,
    ) -> StoreResult<Vec<UploadedFile>> {
        Ok(uploaded_files::Entity::find()
            .filter(uploaded_files::Column::UserId.eq(user_id))
            .filter(uploaded_files::Column::JobId.eq(job_id))
            .filter(uploaded_files::Column::DeletedAt.is_null())
            .order_by_asc(uploaded_files::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(uploaded_file_from_model)
            .collect())
    }

    async fn upsert_uploaded_file(&self, file: &UploadedFile) -> StoreResult<()> {
        let model = uploaded_files::ActiveModel {
            id: Set(file.id),
            file_id: Set(file.file_id.clone()),
            user_id: Set(file.user_id.clone()),
            job_id: Set(file.job_id),
            job_type: Set(file.job_type.clone()),
            file_status: Set(file.file_status.clone()),
            batch_status: Set(file.batch_status.clone()),
            chunk_no: Set(file.chunk_no.clone()),
            total_rows_processed: Set(file.total_rows_processed),
            created_at: Set(fixed(file.created_at)),
            updated_at: Set(fixed(file.updated_at)),
            deleted_at: Set(file.deleted_at.map(fixed)),
        };
        uploaded_files::Entity::insert(model)
            .on_conflict(
                OnConflict::column(uploaded_files::Column::Id)
                    .update_columns([
                        uploaded_files::Column::FileId,
                        uploaded_files::Column::FileStatus,
                        uploaded_files::Column::BatchStatus,
                        uploaded_files::Column::TotalRowsProcessed,
                        uploaded_files::Column::UpdatedAt,
                        uploaded_files::Column::DeletedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn soft_delete_uploaded_file(
        &self,
        user_id: &str,
        file_id: &str,
    ) -> StoreResult<SoftDeleteOutcome> {
        let rows = uploaded_files::Entity::find()
            .filter(uploaded_files::Column::UserId.eq(user_id))
            .filter(uploaded_files::Column::FileId.eq(file_id))
            .all(&self.db)
            .await?;
        let outcome = delete_outcome(&rows, |r| r.deleted_at.is_some());
        if outcome == SoftDeleteOutcome::Deleted {
            let now = fixed(Utc::now());
            uploaded_files::Entity::update_many()
                .col_expr(uploaded_files::Column::DeletedAt, Expr::value(now))
                .col_expr(uploaded_files::Column::UpdatedAt, Expr::value(now))
                .filter(uploaded_files::Column::UserId.eq(user_id))
                .filter(uploaded_files::Column::FileId.eq(file_id))
                .filter(uploaded_files::Column::DeletedAt.is_null())
                .exec(&self.db)
                .await?;
        }
        Ok(outcome)
    }

    async fn find_batch_file(
        &self,
        user_id: &str,
        job_id: Uuid,
        batch_id: &str,
    ) -> StoreResult<Option<BatchFile>> {
        Ok(batch_files::Entity::find_by_id(batch_id.to_string())
            .filter(batch_files::Column::UserId.eq(user_id))
            .filter(batch_files::Column::JobId.eq(job_id))
            .filter(batch_files::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .map(batch_file_from_model))
    }

    async fn list_batch_files(&self, user_id: &str, job_id: Uuid) -> StoreResult<Vec<BatchFile>> {
        Ok(batch_files::Entity::find()
            .filter(batch_files::Column::UserId.eq(user_id))
            .filter(batch_files::Column::JobId.eq(job_id))
            .filter(batch_files::Column::DeletedAt.is_null())
            .order_by_asc(batch_files::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(batch_file_from_model)
            .collect())
    }

    async fn upsert_batch_file(&self, file: &BatchFile) -> StoreResult<()> {
        let model = batch_files::ActiveModel {
            batch_id: Set(file.batch_id.clone()),
            user_id: Set(file.user_id.clone()),
            job_id: Set(file.job_id),
            file_id: Set(file.file_id.clone()),
            output_file_id: Set(file.output_file_id.clone()),
            job_type: Set(file.job_type.clone()),
            status: Set(file.status.clone()),
            chunk_no: Set(file.chunk_no.clone()),
            total_rows_processed: Set(file.total_rows_processed),
            created_at: Set(fixed(file.created_at)),
            updated_at: Set(fixed(file.updated_at)),
            deleted_at: Set(file.deleted_at.map(fixed)),
        };
        batch_files::Entity::insert(model)
            .on_conflict(
                OnConflict::column(batch_files::Column::BatchId)
                    .update_columns([
                        batch_files::Column::OutputFileId,
                        batch_files::Column::Status,
                        batch_files::Column::UpdatedAt,
                        batch_files::Column::DeletedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn soft_delete_batch_file(
        &self,
        user_id: &str,
        batch_id: &str,
    ) -> StoreResult<SoftDeleteOutcome> {
        let rows = batch_files::Entity::find_by_id(batch_id.to_string())
            .filter(batch_files::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?;
        let outcome = delete_outcome(&rows, |r| r.deleted_at.is_some());
        if outcome == SoftDeleteOutcome::Deleted {
            let now = fixed(Utc::now());
            batch_files::Entity::update_many()
                .col_expr(batch_files::Column::DeletedAt, Expr::value(now))
                .col_expr(batch_files::Column::UpdatedAt, Expr::value(now))
                .filter(batch_files::Column::BatchId.eq(batch_id))
                .filter(batch_files::Column::UserId.eq(user_id))
                .filter(batch_files::Column::DeletedAt.is_null())
                .exec(&self.db)
                .await?;
        }
        Ok(outcome)
    }

    async fn list_test_jobs(&self, user_id: &str) -> StoreResult<Vec<TestJob>> {
        Ok(test_jobs::Entity::find()
            .filter(test_jobs::Column::UserId.eq(user_id))
            .filter(test_jobs::Column::DeletedAt.is_null())
            .order_by_desc(test_jobs::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(test_job_from_model)
            .collect())
    }

    async fn upsert_test_job(&self, job: &TestJob) -> StoreResult<()> {
        let model = test_jobs::ActiveModel {
            id: Set(job.id),
            user_id: Set(job.user_id.clone()),
            job_title: Set(job.job_title.clone()),
            file_name: Set(job.file_name.clone()),
            job_type: Set(job.job_type.clone()),
            status: Set(job.status.clone()),
            total_rows_processed: Set(job.total_rows_processed),
            model: Set(job.model.clone()),
            avg_input_token: Set(job.avg_input_token),
            avg_completion_token: Set(job.avg_completion_token),
            avg_total_token: Set(job.avg_total_token),
            avg_cost_per_row: Set(job.avg_cost_per_row),
            created_at: Set(fixed(job.created_at)),
            updated_at: Set(fixed(job.updated_at)),
            deleted_at: Set(job.deleted_at.map(fixed)),
        };
        test_jobs::Entity::insert(model)
            .on_conflict(
                OnConflict::column(test_jobs::Column::Id)
                    .update_columns([
                        test_jobs::Column::Status,
                        test_jobs::Column::TotalRowsProcessed,
                        test_jobs::Column::AvgInputToken,
                        test_jobs::Column::AvgCompletionToken,
                        test_jobs::Column::AvgTotalToken,
                        test_jobs::Column::AvgCostPerRow,
                        test_jobs::Column::UpdatedAt,
                        test_jobs::Column::DeletedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn soft_delete_test_job(
        &self,
        user_id: &str,
        job_id: Uuid,
    ) -> StoreResult<SoftDeleteOutcome> {
        let rows = test_jobs::Entity::find_by_id(job_id)
            .filter(test_jobs::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?;
        let outcome = delete_outcome(&rows, |r| r.deleted_at.is_some());
        if outcome == SoftDeleteOutcome::Deleted {
            let now = fixed(Utc::now());
            test_jobs::Entity::update_many()
                .col_expr(test_jobs::Column::DeletedAt, Expr::value(now))
                .col_expr(test_jobs::Column::UpdatedAt, Expr::value(now))
                .filter(test_jobs::Column::Id.eq(job_id))
                .filter(test_jobs::Column::UserId.eq(user_id))
                .filter(test_jobs::Column::DeletedAt.is_null())
                .exec(&self.db)
                .await?;
        }
        Ok(outcome)
    }
}
