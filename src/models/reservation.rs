//! Reservation model and its state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::status::{ReservationStatus, StatusCatalog};
use crate::error::{AppError, AppResult};

/// Reservation row as stored in the database
#[derive(Debug, Clone, FromRow)]
pub struct ReservationRow {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub status_id: i32,
    pub reservation_date: DateTime<Utc>,
    pub allocated_copy_id: Option<i32>,
    pub notified_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl ReservationRow {
    pub fn resolve(self, catalog: &StatusCatalog) -> AppResult<Reservation> {
        Ok(Reservation {
            id: self.id,
            user_id: self.user_id,
            book_id: self.book_id,
            status: catalog.reservation_status(self.status_id)?,
            reservation_date: self.reservation_date,
            allocated_copy_id: self.allocated_copy_id,
            notified_at: self.notified_at,
            expires_at: self.expires_at,
            fulfilled_at: self.fulfilled_at,
            cancelled_at: self.cancelled_at,
            cancellation_reason: self.cancellation_reason,
        })
    }
}

/// A user's place in the queue for a book
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Reservation {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub status: ReservationStatus,
    pub reservation_date: DateTime<Utc>,
    /// Copy on hold for this reservation (set once notified)
    pub allocated_copy_id: Option<i32>,
    pub notified_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl Reservation {
    pub fn ensure_owner(&self, user_id: i32) -> AppResult<()> {
        if self.user_id != user_id {
            return Err(AppError::Forbidden(
                "You can only manage your own reservations".to_string(),
            ));
        }
        Ok(())
    }

    /// Check the reservation can be turned into a borrow at `now`.
    ///
    /// Returns the id of the copy held for it.
    pub fn check_fulfillable(&self, now: DateTime<Utc>) -> AppResult<i32> {
        if self.status != ReservationStatus::Notified {
            return Err(AppError::Conflict(format!(
                "Reservation is not ready for fulfillment (status {})",
                self.status
            )));
        }
        if matches!(self.expires_at, Some(expires_at) if now > expires_at) {
            return Err(AppError::Expired("Reservation hold has expired".to_string()));
        }
        self.allocated_copy_id
            .ok_or_else(|| AppError::Conflict("No copy allocated to this reservation".to_string()))
    }

    pub fn check_cancellable(&self) -> AppResult<()> {
        if self.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Reservation is already {}",
                self.status.as_str().to_lowercase()
            )));
        }
        Ok(())
    }

    /// Copy to hand back to the queue when this reservation stops being active
    pub fn held_copy(&self) -> Option<i32> {
        match self.status {
            ReservationStatus::Notified => self.allocated_copy_id,
            _ => None,
        }
    }
}

/// Result of enrolling in a queue
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Enrollment {
    pub reservation: Reservation,
    /// 1-indexed position among waiting reservations for the book
    pub queue_position: i64,
    /// Copies currently available (informational only)
    pub available_copies: i64,
}

/// Queue position report for one reservation
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueuePosition {
    pub reservation_id: i32,
    pub status: ReservationStatus,
    /// None unless the reservation is still waiting
    pub queue_position: Option<i64>,
    pub total_waiting: Option<i64>,
}

/// Cancel reservation request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CancelReservation {
    /// Acting user (staff only, defaults to the caller)
    pub user_id: Option<i32>,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Filters for listing reservations
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ReservationQuery {
    pub user_id: Option<i32>,
    pub book_id: Option<i32>,
    pub status: Option<ReservationStatus>,
}
