use std::sync::Arc;

use promptbatch_control::config::AppConfig;
use promptbatch_control::history::SeaOrmHistoryStore;
use promptbatch_control::provider::AzureConnector;
use promptbatch_control::routes;
use promptbatch_control::state::AppState;
use sea_orm_migration::MigratorTrait;

async fn init_db_and_migrate(config: &AppConfig) -> anyhow::Result<SeaOrmHistoryStore> {
    let db = promptbatch_db::connect(&config.database_url).await?;

    // Apply migrations on boot (idempotent).
    promptbatch_migration::Migrator::up(&db, None).await?;

    Ok(SeaOrmHistoryStore::new(db))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env()?;
    let store = init_db_and_migrate(&config).await?;
    let connector = AzureConnector::new(
        config.http_timeout,
        config.api_version.clone(),
        config.chat_api_version.clone(),
    )?;

    let addr = config.bind;
    let state = AppState {
        store: Arc::new(store),
        connector: Arc::new(connector),
        config: Arc::new(config),
    };
    let app = routes::router(state);
    tracing::info!(%addr, "promptbatch-control HTTP listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
