//! Reservation queue: FIFO per book, promotion of freed copies, holds

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrow::BorrowDetails,
        reservation::{Enrollment, QueuePosition, Reservation, ReservationQuery},
        status::{CopyStatus, ReservationStatus},
    },
    repository::Repository,
};

use super::policies::PolicyResolver;

/// What happened to a freed copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// Nobody was waiting; the copy is Available again
    Released,
    /// The copy is on Hold for this reservation
    Notified { reservation_id: i32 },
}

#[derive(Clone)]
pub struct ReservationQueue {
    repository: Repository,
    policies: PolicyResolver,
}

impl ReservationQueue {
    pub fn new(repository: Repository, policies: PolicyResolver) -> Self {
        Self { repository, policies }
    }

    /// Get a reservation by ID
    pub async fn get(&self, id: i32) -> AppResult<Reservation> {
        let mut conn = self.repository.pool.acquire().await?;
        self.repository.reservations.get_by_id(&mut conn, id).await
    }

    /// List reservations in queue order
    pub async fn list(&self, query: &ReservationQuery) -> AppResult<Vec<Reservation>> {
        self.repository.reservations.list(query).await
    }

    /// Join the queue for a book
    pub async fn enroll(&self, user_id: i32, book_id: i32) -> AppResult<Enrollment> {
        let now = Utc::now();
        let mut tx = self.repository.pool.begin().await?;

        let (_, policy) = self.policies.for_user_locked(&mut tx, user_id).await?;
        self.repository.books.get_short(&mut tx, book_id).await?;

        if self.repository.reservations.has_active(&mut tx, user_id, book_id).await? {
            return Err(AppError::Conflict(
                "You already have an active reservation for this book".to_string(),
            ));
        }

        if self
            .repository
            .borrows
            .user_has_active_for_book(&mut tx, user_id, book_id)
            .await?
        {
            return Err(AppError::Conflict("You have already borrowed this book".to_string()));
        }

        let active = self.repository.reservations.count_active_for_user(&mut tx, user_id).await?;
        policy.check_reservation_quota(active)?;

        let available_copies = self
            .repository
            .copies
            .count_by_status(&mut tx, book_id, CopyStatus::Available)
            .await?;

        let reservation = self
            .repository
            .reservations
            .create_waiting(&mut tx, user_id, book_id, now)
            .await?;
        let queue_position = self.repository.reservations.queue_position(&mut tx, &reservation).await?;

        tx.commit().await?;

        tracing::info!(
            reservation_id = reservation.id,
            user_id,
            book_id,
            queue_position,
            "Reservation enrolled"
        );

        Ok(Enrollment {
            reservation,
            queue_position,
            available_copies,
        })
    }

    /// Position of a reservation in its book's queue
    pub async fn position(&self, id: i32) -> AppResult<QueuePosition> {
        let mut conn = self.repository.pool.acquire().await?;
        let reservation = self.repository.reservations.get_by_id(&mut conn, id).await?;

        if reservation.status != ReservationStatus::Waiting {
            return Ok(QueuePosition {
                reservation_id: reservation.id,
                status: reservation.status,
                queue_position: None,
                total_waiting: None,
            });
        }

        let position = self.repository.reservations.queue_position(&mut conn, &reservation).await?;
        let total = self.repository.reservations.count_waiting(&mut conn, reservation.book_id).await?;

        Ok(QueuePosition {
            reservation_id: reservation.id,
            status: reservation.status,
            queue_position: Some(position),
            total_waiting: Some(total),
        })
    }

    /// Hand a freed copy to the oldest waiting reservation, or release it.
    ///
    /// Runs inside the caller's transaction. The hold length comes from the
    /// reservation owner's policy at promotion time.
    pub async fn promote(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        copy_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Promotion> {
        loop {
            let Some(head) = self.repository.reservations.head_of_queue(conn, book_id).await? else {
                self.repository.copies.set_status(conn, copy_id, CopyStatus::Available).await?;
                tracing::debug!(book_id, copy_id, "Queue empty, copy released");
                return Ok(Promotion::Released);
            };

            let (_, policy) = self.policies.for_user(conn, head.user_id).await?;
            let expires_at = policy.hold_expiry(now);

            // A concurrent promotion may have taken this head; look again
            if !self
                .repository
                .reservations
                .mark_notified(conn, head.id, copy_id, now, expires_at)
                .await?
            {
                continue;
            }

            self.repository.copies.set_status(conn, copy_id, CopyStatus::Hold).await?;

            tracing::info!(
                reservation_id = head.id,
                user_id = head.user_id,
                book_id,
                copy_id,
                %expires_at,
                "Copy placed on hold for reservation"
            );

            return Ok(Promotion::Notified { reservation_id: head.id });
        }
    }

    /// Borrow the copy held for a notified reservation
    pub async fn fulfill(&self, reservation_id: i32, user_id: i32) -> AppResult<BorrowDetails> {
        let now = Utc::now();
        let mut tx = self.repository.pool.begin().await?;

        let reservation = self.repository.reservations.lock_by_id(&mut tx, reservation_id).await?;
        reservation.ensure_owner(user_id)?;
        let copy_id = reservation.check_fulfillable(now)?;

        let (_, policy) = self.policies.for_user_locked(&mut tx, user_id).await?;
        let active = self.repository.borrows.count_active_for_user(&mut tx, user_id).await?;
        policy.check_borrow_quota(active)?;

        if !self
            .repository
            .copies
            .transition(&mut tx, copy_id, CopyStatus::Hold, CopyStatus::Borrowed)
            .await?
        {
            return Err(AppError::Conflict(
                "Allocated copy is no longer on hold".to_string(),
            ));
        }

        let record = self
            .repository
            .borrows
            .create(&mut tx, user_id, copy_id, &policy, now)
            .await?;

        if !self.repository.reservations.mark_fulfilled(&mut tx, reservation_id, now).await? {
            return Err(AppError::Conflict(
                "Reservation is not ready for fulfillment".to_string(),
            ));
        }

        let details = self.repository.borrows.get_details(&mut tx, record.id).await?;
        tx.commit().await?;

        tracing::info!(reservation_id, borrow_id = record.id, user_id, copy_id, "Reservation fulfilled");
        Ok(details)
    }

    /// Cancel a waiting or notified reservation, passing any held copy on
    pub async fn cancel(&self, reservation_id: i32, user_id: i32, reason: Option<&str>) -> AppResult<Reservation> {
        let now = Utc::now();
        let mut tx = self.repository.pool.begin().await?;

        let reservation = self.repository.reservations.lock_by_id(&mut tx, reservation_id).await?;
        reservation.ensure_owner(user_id)?;
        reservation.check_cancellable()?;

        if !self
            .repository
            .reservations
            .mark_cancelled(&mut tx, reservation_id, reservation.status, now, reason)
            .await?
        {
            return Err(AppError::Conflict("Reservation changed state, retry".to_string()));
        }

        if let Some(copy_id) = reservation.held_copy() {
            self.promote(&mut tx, reservation.book_id, copy_id, now).await?;
        }

        let cancelled = self.repository.reservations.get_by_id(&mut tx, reservation_id).await?;
        tx.commit().await?;

        tracing::info!(reservation_id, user_id, was = %reservation.status, "Reservation cancelled");
        Ok(cancelled)
    }
}
