//! Copy administration: list, add and retire copies of a book

use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::copy::BookCopy,
    repository::Repository,
};

use super::reservations::{Promotion, ReservationQueue};

#[derive(Clone)]
pub struct CopiesService {
    repository: Repository,
    queue: ReservationQueue,
}

impl CopiesService {
    pub fn new(repository: Repository, queue: ReservationQueue) -> Self {
        Self { repository, queue }
    }

    /// List copies of a book
    pub async fn list_for_book(&self, book_id: i32) -> AppResult<Vec<BookCopy>> {
        let mut conn = self.repository.pool.acquire().await?;
        self.repository.books.get_short(&mut conn, book_id).await?;
        self.repository.copies.list_for_book(&mut conn, book_id).await
    }

    /// Add a copy. It goes straight to the head of the queue when someone is waiting.
    pub async fn add(&self, book_id: i32, license_key: &str) -> AppResult<BookCopy> {
        let now = Utc::now();
        let mut tx = self.repository.pool.begin().await?;

        self.repository.books.get_short(&mut tx, book_id).await?;
        let copy = self.repository.copies.create(&mut tx, book_id, license_key).await?;
        let promotion = self.queue.promote(&mut tx, book_id, copy.id, now).await?;

        let copy = match promotion {
            Promotion::Released => copy,
            Promotion::Notified { .. } => self.repository.copies.get_by_id(&mut tx, copy.id).await?,
        };
        tx.commit().await?;

        tracing::info!(copy_id = copy.id, book_id, status = %copy.status, "Copy added");
        Ok(copy)
    }

    /// Soft-retire an available copy
    pub async fn retire(&self, copy_id: i32) -> AppResult<BookCopy> {
        let now = Utc::now();
        let mut tx = self.repository.pool.begin().await?;

        let copy = self.repository.copies.get_by_id(&mut tx, copy_id).await?;
        if copy.retired_at.is_some() {
            return Err(AppError::Conflict("Copy is already retired".to_string()));
        }
        if !self.repository.copies.retire(&mut tx, copy_id, now).await? {
            return Err(AppError::Conflict(format!(
                "Only available copies can be retired (copy is {})",
                copy.status
            )));
        }

        let retired = self.repository.copies.get_by_id(&mut tx, copy_id).await?;
        tx.commit().await?;

        tracing::info!(copy_id, "Copy retired");
        Ok(retired)
    }
}
