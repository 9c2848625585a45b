//! Borrow record model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::book::BookShort;
use super::policy::Policy;

/// Borrow record from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRecord {
    pub id: i32,
    pub user_id: i32,
    pub copy_id: i32,
    /// Policy in effect when the copy was borrowed
    pub policy_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
}

impl BorrowRecord {
    pub fn is_active(&self) -> bool {
        self.return_date.is_none()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.due_date < now
    }
}

/// Borrow with resolved associations for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowDetails {
    pub id: i32,
    pub user_id: i32,
    pub copy_id: i32,
    pub license_key: String,
    pub book: BookShort,
    pub policy: Policy,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub is_overdue: bool,
}

/// Which copy to borrow: any copy of a book, or one specific copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyTarget {
    pub book_id: Option<i32>,
    pub copy_id: Option<i32>,
}

/// Create borrow command
#[derive(Debug, Clone)]
pub struct CreateBorrow {
    pub user_id: i32,
    pub target: CopyTarget,
}

/// Filters for listing borrows
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BorrowQuery {
    /// Only borrows of this user
    pub user_id: Option<i32>,
    /// true = not yet returned, false = returned
    pub active: Option<bool>,
}
