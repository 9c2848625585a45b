//! Batch sweeps for overdue borrows and lapsed holds

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, repository::Repository};

use super::reservations::ReservationQueue;

/// Candidates found when a sweep started, keyed by sweep kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum SweepTotal {
    #[serde(rename = "total_overdue")]
    Overdue(usize),
    #[serde(rename = "total_expired")]
    Expired(usize),
}

impl SweepTotal {
    pub fn count(&self) -> usize {
        match self {
            SweepTotal::Overdue(n) | SweepTotal::Expired(n) => *n,
        }
    }
}

/// Outcome of one sweep. Per-item failures are collected, not fatal.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SweepReport {
    /// Items whose transaction committed
    pub processed_count: usize,
    #[serde(flatten)]
    pub total: SweepTotal,
    /// Candidates already handled by someone else when reached
    pub skipped_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl SweepReport {
    fn new(total: SweepTotal) -> Self {
        Self {
            processed_count: 0,
            total,
            skipped_count: 0,
            errors: Vec::new(),
        }
    }
}

enum ItemOutcome {
    Processed,
    Skipped,
}

#[derive(Clone)]
pub struct Reconciler {
    repository: Repository,
    queue: ReservationQueue,
}

impl Reconciler {
    pub fn new(repository: Repository, queue: ReservationQueue) -> Self {
        Self { repository, queue }
    }

    /// Return every borrow that is past due at `now`
    pub async fn auto_return(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let ids = self.repository.borrows.overdue_ids(now).await?;
        let mut report = SweepReport::new(SweepTotal::Overdue(ids.len()));

        for borrow_id in ids {
            match self.return_overdue(borrow_id, now).await {
                Ok(ItemOutcome::Processed) => report.processed_count += 1,
                Ok(ItemOutcome::Skipped) => report.skipped_count += 1,
                Err(e) => {
                    tracing::error!(borrow_id, error = %e, "Auto-return failed");
                    report.errors.push(format!("Failed to auto-return borrow {}: {}", borrow_id, e));
                }
            }
        }

        tracing::info!(
            processed = report.processed_count,
            total = report.total.count(),
            failed = report.errors.len(),
            "Auto-return sweep finished"
        );
        Ok(report)
    }

    async fn return_overdue(&self, borrow_id: i32, now: DateTime<Utc>) -> AppResult<ItemOutcome> {
        let mut tx = self.repository.pool.begin().await?;

        // Returned by its owner since the candidate list was read
        if !self.repository.borrows.mark_returned(&mut tx, borrow_id, now).await? {
            return Ok(ItemOutcome::Skipped);
        }

        let record = self.repository.borrows.get_by_id(&mut tx, borrow_id).await?;
        let copy = self.repository.copies.get_by_id(&mut tx, record.copy_id).await?;
        self.queue.promote(&mut tx, copy.book_id, copy.id, now).await?;

        tx.commit().await?;
        tracing::info!(borrow_id, user_id = record.user_id, copy_id = copy.id, "Overdue borrow auto-returned");
        Ok(ItemOutcome::Processed)
    }

    /// Expire every notified reservation whose hold lapsed before `now`
    pub async fn expire_notified(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let ids = self.repository.reservations.expired_notified_ids(now).await?;
        let mut report = SweepReport::new(SweepTotal::Expired(ids.len()));

        for reservation_id in ids {
            match self.expire_one(reservation_id, now).await {
                Ok(ItemOutcome::Processed) => report.processed_count += 1,
                Ok(ItemOutcome::Skipped) => report.skipped_count += 1,
                Err(e) => {
                    tracing::error!(reservation_id, error = %e, "Hold expiry failed");
                    report
                        .errors
                        .push(format!("Failed to expire reservation {}: {}", reservation_id, e));
                }
            }
        }

        tracing::info!(
            processed = report.processed_count,
            total = report.total.count(),
            failed = report.errors.len(),
            "Expire-notified sweep finished"
        );
        Ok(report)
    }

    async fn expire_one(&self, reservation_id: i32, now: DateTime<Utc>) -> AppResult<ItemOutcome> {
        let mut tx = self.repository.pool.begin().await?;

        let reservation = self.repository.reservations.lock_by_id(&mut tx, reservation_id).await?;

        // Fulfilled or cancelled since the candidate list was read
        if !self.repository.reservations.mark_expired(&mut tx, reservation_id, now).await? {
            return Ok(ItemOutcome::Skipped);
        }

        if let Some(copy_id) = reservation.allocated_copy_id {
            self.queue.promote(&mut tx, reservation.book_id, copy_id, now).await?;
        }

        tx.commit().await?;
        tracing::warn!(
            reservation_id,
            user_id = reservation.user_id,
            book_id = reservation.book_id,
            "Hold expired without pickup"
        );
        Ok(ItemOutcome::Processed)
    }
}

/// Spawn the periodic sweep task
pub fn spawn_reconciler(reconciler: Reconciler, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            if let Err(e) = reconciler.auto_return(now).await {
                tracing::error!(error = %e, "Auto-return sweep could not start");
            }
            if let Err(e) = reconciler.expire_notified(now).await {
                tracing::error!(error = %e, "Expire-notified sweep could not start");
            }
        }
    })
}
