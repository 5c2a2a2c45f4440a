use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BatchJobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BatchJobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(BatchJobs::UserId).string().not_null())
                    .col(ColumnDef::new(BatchJobs::JobTitle).string().not_null())
                    .col(ColumnDef::new(BatchJobs::FileName).string().not_null())
                    .col(ColumnDef::new(BatchJobs::JobType).string().not_null())
                    .col(ColumnDef::new(BatchJobs::Chunks).integer().not_null())
                    .col(ColumnDef::new(BatchJobs::ChunkSize).integer().not_null())
                    .col(
                        ColumnDef::new(BatchJobs::TotalRowsProcessed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(BatchJobs::Model).string().not_null())
                    .col(ColumnDef::new(BatchJobs::Endpoint).string().not_null())
                    .col(ColumnDef::new(BatchJobs::ApiKey).string().not_null())
                    .col(ColumnDef::new(BatchJobs::PromptJson).text().not_null())
                    .col(
                        ColumnDef::new(BatchJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BatchJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BatchJobs::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_batch_jobs_user_id")
                    .table(BatchJobs::Table)
                    .col(BatchJobs::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_batch_jobs_user_id")
                    .table(BatchJobs::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(BatchJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BatchJobs {
    Table,
    Id,
    UserId,
    JobTitle,
    FileName,
    JobType,
    Chunks,
    ChunkSize,
    TotalRowsProcessed,
    Model,
    Endpoint,
    ApiKey,
    PromptJson,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
