pub mod appresult;
pub mod config;
pub mod events;
pub mod hub;
pub mod store;
pub mod ws;

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

pub use crate::appresult::{AppError, AppResult};

use crate::hub::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub hub: Arc<Hub>,
}
