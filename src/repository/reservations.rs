//! Reservations repository for database operations

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        reservation::{Reservation, ReservationQuery, ReservationRow},
        status::{ReservationStatus, StatusCatalog},
    },
};

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
    catalog: Arc<StatusCatalog>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>, catalog: Arc<StatusCatalog>) -> Self {
        Self { pool, catalog }
    }

    fn status_id(&self, status: ReservationStatus) -> i32 {
        self.catalog.reservation_id(status)
    }

    /// Get reservation by ID
    pub async fn get_by_id(&self, conn: &mut PgConnection, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, ReservationRow>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))?
            .resolve(&self.catalog)
    }

    /// Get reservation by ID and lock it until the transaction ends
    pub async fn lock_by_id(&self, conn: &mut PgConnection, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, ReservationRow>("SELECT * FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))?
            .resolve(&self.catalog)
    }

    /// List reservations in queue order
    pub async fn list(&self, query: &ReservationQuery) -> AppResult<Vec<Reservation>> {
        let mut conditions = Vec::new();
        let mut idx = 1;

        if query.user_id.is_some() {
            conditions.push(format!("user_id = ${}", idx));
            idx += 1;
        }
        if query.book_id.is_some() {
            conditions.push(format!("book_id = ${}", idx));
            idx += 1;
        }
        if query.status.is_some() {
            conditions.push(format!("status_id = ${}", idx));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let select_q = format!(
            "SELECT * FROM reservations {} ORDER BY reservation_date ASC, id ASC",
            where_clause
        );
        let mut builder = sqlx::query_as::<_, ReservationRow>(&select_q);
        if let Some(user_id) = query.user_id {
            builder = builder.bind(user_id);
        }
        if let Some(book_id) = query.book_id {
            builder = builder.bind(book_id);
        }
        if let Some(status) = query.status {
            builder = builder.bind(self.status_id(status));
        }

        builder
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.resolve(&self.catalog))
            .collect()
    }

    /// Whether the user already has a Waiting or Notified reservation for the book
    pub async fn has_active(&self, conn: &mut PgConnection, user_id: i32, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE user_id = $1 AND book_id = $2 AND status_id = ANY($3)
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(self.catalog.active_reservation_ids())
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    /// Count Waiting and Notified reservations of a user
    pub async fn count_active_for_user(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE user_id = $1 AND status_id = ANY($2)",
        )
        .bind(user_id)
        .bind(self.catalog.active_reservation_ids())
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    /// Insert a Waiting reservation
    pub async fn create_waiting(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, ReservationRow>(
            r#"
            INSERT INTO reservations (user_id, book_id, status_id, reservation_date)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(self.status_id(ReservationStatus::Waiting))
        .bind(now)
        .fetch_one(&mut *conn)
        .await?
        .resolve(&self.catalog)
    }

    /// Oldest Waiting reservation for a book. Equal dates fall back to insertion order.
    pub async fn head_of_queue(&self, conn: &mut PgConnection, book_id: i32) -> AppResult<Option<Reservation>> {
        sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT * FROM reservations
            WHERE book_id = $1 AND status_id = $2
            ORDER BY reservation_date ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(book_id)
        .bind(self.status_id(ReservationStatus::Waiting))
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| row.resolve(&self.catalog))
        .transpose()
    }

    /// 1-indexed position of a waiting reservation in its book's queue
    pub async fn queue_position(&self, conn: &mut PgConnection, reservation: &Reservation) -> AppResult<i64> {
        let ahead: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM reservations
            WHERE book_id = $1 AND status_id = $2
              AND (reservation_date, id) < ($3, $4)
            "#,
        )
        .bind(reservation.book_id)
        .bind(self.status_id(ReservationStatus::Waiting))
        .bind(reservation.reservation_date)
        .bind(reservation.id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(ahead + 1)
    }

    /// Count Waiting reservations for a book
    pub async fn count_waiting(&self, conn: &mut PgConnection, book_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE book_id = $1 AND status_id = $2",
        )
        .bind(book_id)
        .bind(self.status_id(ReservationStatus::Waiting))
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    /// Waiting -> Notified with a held copy. Returns false if no longer Waiting.
    pub async fn mark_notified(
        &self,
        conn: &mut PgConnection,
        id: i32,
        copy_id: i32,
        notified_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET status_id = $1, allocated_copy_id = $2, notified_at = $3, expires_at = $4
            WHERE id = $5 AND status_id = $6
            "#,
        )
        .bind(self.status_id(ReservationStatus::Notified))
        .bind(copy_id)
        .bind(notified_at)
        .bind(expires_at)
        .bind(id)
        .bind(self.status_id(ReservationStatus::Waiting))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Notified -> Fulfilled. Returns false if no longer Notified.
    pub async fn mark_fulfilled(&self, conn: &mut PgConnection, id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE reservations SET status_id = $1, fulfilled_at = $2 WHERE id = $3 AND status_id = $4",
        )
        .bind(self.status_id(ReservationStatus::Fulfilled))
        .bind(now)
        .bind(id)
        .bind(self.status_id(ReservationStatus::Notified))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Notified -> Expired, only once the hold has actually lapsed at `now`
    pub async fn mark_expired(&self, conn: &mut PgConnection, id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE reservations SET status_id = $1 WHERE id = $2 AND status_id = $3 AND expires_at < $4",
        )
        .bind(self.status_id(ReservationStatus::Expired))
        .bind(id)
        .bind(self.status_id(ReservationStatus::Notified))
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `current` -> Cancelled. Returns false if the status changed meanwhile.
    pub async fn mark_cancelled(
        &self,
        conn: &mut PgConnection,
        id: i32,
        current: ReservationStatus,
        now: DateTime<Utc>,
        reason: Option<&str>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET status_id = $1, cancelled_at = $2, cancellation_reason = $3
            WHERE id = $4 AND status_id = $5
            "#,
        )
        .bind(self.status_id(ReservationStatus::Cancelled))
        .bind(now)
        .bind(reason)
        .bind(id)
        .bind(self.status_id(current))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Ids of Notified reservations whose hold lapsed before `now`
    pub async fn expired_notified_ids(&self, now: DateTime<Utc>) -> AppResult<Vec<i32>> {
        let ids = sqlx::query_scalar::<_, i32>(
            "SELECT id FROM reservations WHERE status_id = $1 AND expires_at < $2 ORDER BY expires_at, id",
        )
        .bind(self.status_id(ReservationStatus::Notified))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
