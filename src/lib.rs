//! Lendwise library lending engine
//!
//! Allocates physical or digital copies of books to borrowers, keeps a
//! first-come-first-served reservation queue per book and exposes both
//! through a REST JSON API.

use std::sync::Arc;

use sqlx::{Pool, Postgres};

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: Pool<Postgres>,
    pub services: Arc<services::Services>,
}
