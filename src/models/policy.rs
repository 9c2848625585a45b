//! Borrowing policy model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

/// Per-role borrowing rules
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Policy {
    pub id: i32,
    pub role_id: i32,
    /// Loan length in days
    pub max_borrow_days: i32,
    /// Cap on simultaneous active borrows (and, separately, active reservations)
    pub max_borrow_books: i32,
    /// How long a notified reservation holds its copy
    pub hold_hours: i32,
}

impl Policy {
    pub fn due_date(&self, borrowed_at: DateTime<Utc>) -> DateTime<Utc> {
        borrowed_at + Duration::days(self.max_borrow_days as i64)
    }

    pub fn hold_expiry(&self, notified_at: DateTime<Utc>) -> DateTime<Utc> {
        notified_at + Duration::hours(self.hold_hours as i64)
    }

    /// Reject a new borrow when `active_borrows` already reaches the limit
    pub fn check_borrow_quota(&self, active_borrows: i64) -> AppResult<()> {
        if active_borrows >= self.max_borrow_books as i64 {
            return Err(AppError::QuotaExceeded {
                message: "Borrow quota exceeded".to_string(),
                details: serde_json::json!({
                    "max_borrow_book": self.max_borrow_books,
                    "active_borrows": active_borrows,
                }),
            });
        }
        Ok(())
    }

    /// Reject a new reservation when `active_reservations` already reaches the limit
    pub fn check_reservation_quota(&self, active_reservations: i64) -> AppResult<()> {
        if active_reservations >= self.max_borrow_books as i64 {
            return Err(AppError::QuotaExceeded {
                message: "Reservation quota exceeded".to_string(),
                details: serde_json::json!({
                    "max_reservation_book": self.max_borrow_books,
                    "active_reservations": active_reservations,
                }),
            });
        }
        Ok(())
    }
}
