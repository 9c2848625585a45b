//! Book summary used in borrow and reservation responses

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Minimal view of a catalog title. Catalog metadata itself is managed elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookShort {
    pub id: i32,
    pub title: String,
    pub isbn: Option<String>,
}
