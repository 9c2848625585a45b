//! Copies repository for database operations

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::{
        copy::{BookCopy, BookCopyRow},
        status::{CopyStatus, StatusCatalog},
    },
};

#[derive(Clone)]
pub struct CopiesRepository {
    catalog: Arc<StatusCatalog>,
}

impl CopiesRepository {
    pub fn new(catalog: Arc<StatusCatalog>) -> Self {
        Self { catalog }
    }

    /// Get copy by ID
    pub async fn get_by_id(&self, conn: &mut PgConnection, id: i32) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopyRow>("SELECT * FROM copies WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Copy with id {} not found", id)))?
            .resolve(&self.catalog)
    }

    /// List the copies of a book, retired ones included
    pub async fn list_for_book(&self, conn: &mut PgConnection, book_id: i32) -> AppResult<Vec<BookCopy>> {
        sqlx::query_as::<_, BookCopyRow>("SELECT * FROM copies WHERE book_id = $1 ORDER BY id")
            .bind(book_id)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .map(|row| row.resolve(&self.catalog))
            .collect()
    }

    /// First available, non-retired copy of a book, locked for the rest of the transaction.
    ///
    /// Copies already locked by a concurrent claim are skipped, so racers on a
    /// multi-copy book end up with different copies.
    pub async fn find_available(&self, conn: &mut PgConnection, book_id: i32) -> AppResult<Option<i32>> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT id FROM copies
            WHERE book_id = $1 AND status_id = $2 AND retired_at IS NULL
            ORDER BY id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(book_id)
        .bind(self.catalog.copy_id(CopyStatus::Available))
        .fetch_optional(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Move a copy from `from` to `to` only if it is currently in `from`.
    ///
    /// Returns false when no row matched, i.e. the copy was not in `from`
    /// (another transaction got there first). Retired copies never match.
    pub async fn transition(
        &self,
        conn: &mut PgConnection,
        id: i32,
        from: CopyStatus,
        to: CopyStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE copies SET status_id = $1 WHERE id = $2 AND status_id = $3 AND retired_at IS NULL",
        )
        .bind(self.catalog.copy_id(to))
        .bind(id)
        .bind(self.catalog.copy_id(from))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Set a copy's status unconditionally (queue promotion of a freed copy)
    pub async fn set_status(&self, conn: &mut PgConnection, id: i32, status: CopyStatus) -> AppResult<()> {
        let result = sqlx::query("UPDATE copies SET status_id = $1 WHERE id = $2")
            .bind(self.catalog.copy_id(status))
            .bind(id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Copy with id {} not found", id)));
        }
        Ok(())
    }

    /// Count non-retired copies of a book in a given status
    pub async fn count_by_status(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        status: CopyStatus,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM copies WHERE book_id = $1 AND status_id = $2 AND retired_at IS NULL",
        )
        .bind(book_id)
        .bind(self.catalog.copy_id(status))
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    /// Count non-retired copies of a book, whatever their status
    pub async fn count_in_service(&self, conn: &mut PgConnection, book_id: i32) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM copies WHERE book_id = $1 AND retired_at IS NULL")
                .bind(book_id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(count)
    }

    /// Insert a new copy in the Available status
    pub async fn create(&self, conn: &mut PgConnection, book_id: i32, license_key: &str) -> AppResult<BookCopy> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM copies WHERE license_key = $1)")
            .bind(license_key)
            .fetch_one(&mut *conn)
            .await?;
        if exists {
            return Err(AppError::Conflict(format!(
                "A copy with license key '{}' already exists",
                license_key
            )));
        }

        sqlx::query_as::<_, BookCopyRow>(
            r#"
            INSERT INTO copies (book_id, license_key, status_id, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(book_id)
        .bind(license_key)
        .bind(self.catalog.copy_id(CopyStatus::Available))
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?
        .resolve(&self.catalog)
    }

    /// Soft-retire an available copy. Returns false if the copy is not Available.
    pub async fn retire(&self, conn: &mut PgConnection, id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE copies SET retired_at = $1 WHERE id = $2 AND status_id = $3 AND retired_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .bind(self.catalog.copy_id(CopyStatus::Available))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
