//! Persistence for batch jobs, uploaded chunk files, provider batches and test-prompt runs.

pub use sea_orm;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

pub mod entities;

pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options.sqlx_logging(false);
    // Every pooled connection to an in-memory SQLite database sees its own database.
    if database_url.starts_with("sqlite::memory:") {
        options.max_connections(1).min_connections(1);
    }
    Database::connect(options).await
}
