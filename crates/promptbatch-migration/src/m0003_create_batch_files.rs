use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BatchFiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BatchFiles::BatchId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BatchFiles::UserId).string().not_null())
                    .col(ColumnDef::new(BatchFiles::JobId).uuid().not_null())
                    .col(ColumnDef::new(BatchFiles::FileId).string().not_null())
                    .col(ColumnDef::new(BatchFiles::OutputFileId).string().null())
                    .col(ColumnDef::new(BatchFiles::JobType).string().not_null())
                    .col(ColumnDef::new(BatchFiles::Status).string().not_null())
                    .col(ColumnDef::new(BatchFiles::ChunkNo).string().not_null())
                    .col(
                        ColumnDef::new(BatchFiles::TotalRowsProcessed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BatchFiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BatchFiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BatchFiles::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_batch_files_job_id")
                    .table(BatchFiles::Table)
                    .col(BatchFiles::JobId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_batch_files_job_id")
                    .table(BatchFiles::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(BatchFiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BatchFiles {
    Table,
    BatchId,
    UserId,
    JobId,
    FileId,
    OutputFileId,
    JobType,
    Status,
    ChunkNo,
    TotalRowsProcessed,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
