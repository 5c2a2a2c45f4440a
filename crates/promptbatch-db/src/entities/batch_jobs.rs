use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "batch_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
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
    pub api_key: String,
    /// JSON array of prompt templates.
    pub prompt_json: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
