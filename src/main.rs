use std::sync::Arc;

use axum::{Router, debug_handler, extract::State, routing::get};
use confab::{AppResult, AppState, config::Config, hub::Hub, store::SqliteStore, ws};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("confab=debug,info")),
        )
        .init();

    let config = Config::from_env()?;

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await?;

    let store = Arc::new(SqliteStore::new(db_pool.clone()));
    let hub = Arc::new(Hub::new(store, config.typing_ttl));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws::hub_ws))
        .layer(CorsLayer::permissive())
        .with_state(AppState { db_pool, hub });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

#[debug_handler(state = AppState)]
async fn healthz(State(db_pool): State<SqlitePool>) -> AppResult<&'static str> {
    sqlx::query("SELECT 1").execute(&db_pool).await?;
    Ok("ok")
}
