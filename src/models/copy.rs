//! Copy (license) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::status::{CopyStatus, StatusCatalog};
use crate::error::AppResult;

/// Copy row as stored in the database
#[derive(Debug, Clone, FromRow)]
pub struct BookCopyRow {
    pub id: i32,
    pub book_id: i32,
    pub license_key: String,
    pub status_id: i32,
    pub created_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
}

/// One allocatable instance of a book
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookCopy {
    pub id: i32,
    pub book_id: i32,
    /// Barcode or digital license key
    pub license_key: String,
    pub status: CopyStatus,
    pub created_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
}

impl BookCopyRow {
    pub fn resolve(self, catalog: &StatusCatalog) -> AppResult<BookCopy> {
        Ok(BookCopy {
            id: self.id,
            book_id: self.book_id,
            license_key: self.license_key,
            status: catalog.copy_status(self.status_id)?,
            created_at: self.created_at,
            retired_at: self.retired_at,
        })
    }
}

/// Add copy request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCopy {
    #[validate(length(min = 1, max = 64))]
    pub license_key: String,
}
