use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TestJobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TestJobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(TestJobs::UserId).string().not_null())
                    .col(ColumnDef::new(TestJobs::JobTitle).string().not_null())
                    .col(ColumnDef::new(TestJobs::FileName).string().not_null())
                    .col(ColumnDef::new(TestJobs::JobType).string().not_null())
                    .col(ColumnDef::new(TestJobs::Status).string().not_null())
                    .col(
                        ColumnDef::new(TestJobs::TotalRowsProcessed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(TestJobs::Model).string().not_null())
                    .col(ColumnDef::new(TestJobs::AvgInputToken).double().not_null())
                    .col(ColumnDef::new(TestJobs::AvgCompletionToken).double().not_null())
                    .col(ColumnDef::new(TestJobs::AvgTotalToken).double().not_null())
                    .col(ColumnDef::new(TestJobs::AvgCostPerRow).double().not_null())
                    .col(
                        ColumnDef::new(TestJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TestJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TestJobs::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_test_jobs_user_id")
                    .table(TestJobs::Table)
                    .col(TestJobs::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_test_jobs_user_id")
                    .table(TestJobs::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(TestJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TestJobs {
    Table,
    Id,
    UserId,
    JobTitle,
    FileName,
    JobType,
    Status,
    TotalRowsProcessed,
    Model,
    AvgInputToken,
    AvgCompletionToken,
    AvgTotalToken,
    AvgCostPerRow,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
