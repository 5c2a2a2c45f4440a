use sea_orm_migration::prelude::*;

mod m0001_create_batch_jobs;
mod m0002_create_uploaded_files;
mod m0003_create_batch_files;
mod m0004_create_test_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m0001_create_batch_jobs::Migration),
            Box::new(m0002_create_uploaded_files::Migration),
            Box::new(m0003_create_batch_files::Migration),
            Box::new(m0004_create_test_jobs::Migration),
        ]
    }
}
