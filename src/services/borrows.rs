//! Borrow ledger: create and return borrows

use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::borrow::{BorrowDetails, BorrowQuery, CreateBorrow},
    repository::Repository,
};

use super::{allocator::CopyAllocator, policies::PolicyResolver, reservations::ReservationQueue};

#[derive(Clone)]
pub struct BorrowLedger {
    repository: Repository,
    policies: PolicyResolver,
    allocator: CopyAllocator,
    queue: ReservationQueue,
}

impl BorrowLedger {
    pub fn new(
        repository: Repository,
        policies: PolicyResolver,
        allocator: CopyAllocator,
        queue: ReservationQueue,
    ) -> Self {
        Self {
            repository,
            policies,
            allocator,
            queue,
        }
    }

    /// Get a borrow with its associations
    pub async fn get(&self, id: i32) -> AppResult<BorrowDetails> {
        let mut conn = self.repository.pool.acquire().await?;
        self.repository.borrows.get_details(&mut conn, id).await
    }

    /// List borrows, optionally for one user and/or by return state
    pub async fn list(&self, query: &BorrowQuery) -> AppResult<Vec<BorrowDetails>> {
        self.repository.borrows.list(query).await
    }

    /// Borrow a copy: quota check, copy claim and ledger insert in one transaction
    pub async fn create(&self, command: CreateBorrow) -> AppResult<BorrowDetails> {
        if command.target.book_id.is_none() && command.target.copy_id.is_none() {
            return Err(AppError::BadRequest(
                "Either book_id or copy_id must be provided".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.repository.pool.begin().await?;

        let (_, policy) = self.policies.for_user_locked(&mut tx, command.user_id).await?;

        let active = self
            .repository
            .borrows
            .count_active_for_user(&mut tx, command.user_id)
            .await?;
        policy.check_borrow_quota(active)?;

        let copy_id = self.allocator.claim(&mut tx, command.target).await?;

        let record = self
            .repository
            .borrows
            .create(&mut tx, command.user_id, copy_id, &policy, now)
            .await?;

        let details = self.repository.borrows.get_details(&mut tx, record.id).await?;
        tx.commit().await?;

        tracing::info!(
            borrow_id = record.id,
            user_id = command.user_id,
            copy_id,
            due_date = %record.due_date,
            "Copy borrowed"
        );

        Ok(details)
    }

    /// Return a borrow and pass the copy to the reservation queue
    pub async fn return_borrow(&self, borrow_id: i32, requesting_user_id: i32) -> AppResult<BorrowDetails> {
        let now = Utc::now();
        let mut tx = self.repository.pool.begin().await?;

        let record = self.repository.borrows.get_by_id(&mut tx, borrow_id).await?;

        if record.user_id != requesting_user_id {
            return Err(AppError::Forbidden("You can only return your own borrows".to_string()));
        }

        if !self.repository.borrows.mark_returned(&mut tx, borrow_id, now).await? {
            return Err(AppError::Conflict("Borrow already returned".to_string()));
        }

        let copy = self.repository.copies.get_by_id(&mut tx, record.copy_id).await?;
        let promotion = self.queue.promote(&mut tx, copy.book_id, copy.id, now).await?;

        let details = self.repository.borrows.get_details(&mut tx, borrow_id).await?;
        tx.commit().await?;

        tracing::info!(borrow_id, user_id = requesting_user_id, copy_id = copy.id, ?promotion, "Copy returned");
        Ok(details)
    }
}
