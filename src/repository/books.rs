//! Books repository (catalog titles referenced by copies and reservations)

use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::book::BookShort,
};

#[derive(Clone, Default)]
pub struct BooksRepository;

impl BooksRepository {
    pub fn new() -> Self {
        Self
    }

    /// Get book summary by ID
    pub async fn get_short(&self, conn: &mut PgConnection, id: i32) -> AppResult<BookShort> {
        sqlx::query_as::<_, BookShort>("SELECT id, title, isbn FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }
}
