use anyhow::Context;

mod account;
mod app;
mod config;
mod entities;
mod state;

use crate::config::{AppConfig, StorageBackend};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "licenta=info,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;

    let app_state = match config.storage {
        StorageBackend::Postgres => {
            let db = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(&config.database_url)
                .await
                .context("connecting to DATABASE_URL")?;

            if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
                tracing::warn!(error = %e, "migration failed; continuing");
            }
            AppState::postgres(db, config)
        }
        StorageBackend::Memory => {
            tracing::warn!("APP_STORAGE=memory: accounts and entities are not persisted");
            AppState::in_memory_with(config)
        }
    };

    app::serve(app::build_app(app_state)).await
}
