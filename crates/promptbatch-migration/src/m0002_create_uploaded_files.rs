use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UploadedFiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UploadedFiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UploadedFiles::FileId).string().null())
                    .col(ColumnDef::new(UploadedFiles::UserId).string().not_null())
                    .col(ColumnDef::new(UploadedFiles::JobId).uuid().not_null())
                    .col(ColumnDef::new(UploadedFiles::JobType).string().not_null())
                    .col(ColumnDef::new(UploadedFiles::FileStatus).string().not_null())
                    .col(
                        ColumnDef::new(UploadedFiles::BatchStatus)
                            .string()
                            .not_null()
                            .default("not_started"),
                    )
                    .col(ColumnDef::new(UploadedFiles::ChunkNo).string().not_null())
                    .col(
                        ColumnDef::new(UploadedFiles::TotalRowsProcessed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UploadedFiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UploadedFiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UploadedFiles::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_uploaded_files_job_id")
                    .table(UploadedFiles::Table)
                    .col(UploadedFiles::JobId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_uploaded_files_file_id")
                    .table(UploadedFiles::Table)
                    .col(UploadedFiles::FileId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_uploaded_files_file_id")
                    .table(UploadedFiles::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_uploaded_files_job_id")
                    .table(UploadedFiles::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(UploadedFiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UploadedFiles {
    Table,
    Id,
    FileId,
    UserId,
    JobId,
    JobType,
    FileStatus,
    BatchStatus,
    ChunkNo,
    TotalRowsProcessed,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
