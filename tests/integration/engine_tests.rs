//! Engine tests against a real database
//!
//! Fixtures are moved into the past with SQL instead of advancing the sweep
//! clock. Tests that backdate rows or run a sweep hold `sweep_lock`.

use chrono::{Duration, Utc};

use lendwise_server::{
    models::{
        borrow::{CopyTarget, CreateBorrow},
        status::{CopyStatus, ReservationStatus},
    },
    AppError,
};

use crate::common::{harness, sweep_lock, Harness};

fn by_book(user_id: i32, book_id: i32) -> CreateBorrow {
    CreateBorrow {
        user_id,
        target: CopyTarget {
            book_id: Some(book_id),
            copy_id: None,
        },
    }
}

fn by_copy(user_id: i32, copy_id: i32) -> CreateBorrow {
    CreateBorrow {
        user_id,
        target: CopyTarget {
            book_id: None,
            copy_id: Some(copy_id),
        },
    }
}

async fn copy_status(h: &Harness, book_id: i32, copy_id: i32) -> CopyStatus {
    h.services
        .copies
        .list_for_book(book_id)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.id == copy_id)
        .expect("copy listed")
        .status
}

/// Copies of the book marked Borrowed must match its unreturned borrows
async fn assert_ledger_consistent(h: &Harness, book_id: i32) {
    let borrowed: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM copies c
        JOIN copy_statuses s ON s.id = c.status_id
        WHERE c.book_id = $1 AND s.name = 'Borrowed' AND c.retired_at IS NULL
        "#,
    )
    .bind(book_id)
    .fetch_one(&h.pool)
    .await
    .unwrap();

    let open: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM borrows b
        JOIN copies c ON c.id = b.copy_id
        WHERE c.book_id = $1 AND b.return_date IS NULL
        "#,
    )
    .bind(book_id)
    .fetch_one(&h.pool)
    .await
    .unwrap();

    assert_eq!(borrowed, open, "book {}: {} Borrowed copies, {} open borrows", book_id, borrowed, open);
}

async fn backdate_hold(h: &Harness, reservation_id: i32, by: Duration) {
    sqlx::query("UPDATE reservations SET expires_at = $1 WHERE id = $2")
        .bind(Utc::now() - by)
        .bind(reservation_id)
        .execute(&h.pool)
        .await
        .unwrap();
}

async fn backdate_due(h: &Harness, borrow_id: i32, by: Duration) {
    sqlx::query("UPDATE borrows SET due_date = $1 WHERE id = $2")
        .bind(Utc::now() - by)
        .bind(borrow_id)
        .execute(&h.pool)
        .await
        .unwrap();
}

async fn active_borrows_of_copy(h: &Harness, copy_id: i32) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM borrows WHERE copy_id = $1 AND return_date IS NULL")
        .bind(copy_id)
        .fetch_one(&h.pool)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn test_borrow_reserve_return_places_hold() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (book, copies) = h.book(1).await;

    assert_ledger_consistent(&h, book).await;

    let borrow = h.services.borrows.create(by_book(u1, book)).await.unwrap();
    assert_eq!(borrow.copy_id, copies[0]);
    assert_eq!(borrow.due_date - borrow.borrow_date, Duration::days(14));
    assert!(borrow.return_date.is_none());
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Borrowed);
    assert_ledger_consistent(&h, book).await;

    let enrollment = h.services.reservations.enroll(u2, book).await.unwrap();
    assert_eq!(enrollment.queue_position, 1);
    assert_eq!(enrollment.available_copies, 0);
    assert_eq!(enrollment.reservation.status, ReservationStatus::Waiting);
    assert_ledger_consistent(&h, book).await;

    let returned = h.services.borrows.return_borrow(borrow.id, u1).await.unwrap();
    assert!(returned.return_date.is_some());
    assert_ledger_consistent(&h, book).await;

    let reservation = h.services.reservations.get(enrollment.reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Notified);
    assert_eq!(reservation.allocated_copy_id, Some(copies[0]));
    let notified_at = reservation.notified_at.expect("notified_at set");
    assert_eq!(reservation.expires_at, Some(notified_at + Duration::hours(48)));
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Hold);
    assert_ledger_consistent(&h, book).await;

    h.services.reservations.fulfill(reservation.id, u2).await.unwrap();
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Borrowed);
    assert_ledger_consistent(&h, book).await;
}

#[tokio::test]
#[ignore]
async fn test_lapsed_hold_expires_and_releases_copy() {
    let _sweeps = sweep_lock().await;
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (book, copies) = h.book(1).await;

    let borrow = h.services.borrows.create(by_book(u1, book)).await.unwrap();
    let enrollment = h.services.reservations.enroll(u2, book).await.unwrap();
    h.services.borrows.return_borrow(borrow.id, u1).await.unwrap();

    backdate_hold(&h, enrollment.reservation.id, Duration::hours(1)).await;

    let report = h.services.reconciler.expire_notified(Utc::now()).await.unwrap();
    assert!(report.processed_count >= 1);

    let reservation = h.services.reservations.get(enrollment.reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Expired);
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Available);

    // Expired is terminal
    assert!(matches!(
        h.services.reservations.fulfill(enrollment.reservation.id, u2).await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
#[ignore]
async fn test_lapsed_hold_passes_to_next_waiter() {
    let _sweeps = sweep_lock().await;
    let h = harness().await;
    let role = h.role(14, 3, 24).await;
    let (u1, u2, u3) = (h.user(role).await, h.user(role).await, h.user(role).await);
    let (book, copies) = h.book(1).await;

    let borrow = h.services.borrows.create(by_book(u1, book)).await.unwrap();
    let first = h.services.reservations.enroll(u2, book).await.unwrap();
    let second = h.services.reservations.enroll(u3, book).await.unwrap();
    assert_eq!(second.queue_position, 2);
    h.services.borrows.return_borrow(borrow.id, u1).await.unwrap();

    backdate_hold(&h, first.reservation.id, Duration::minutes(5)).await;
    h.services.reconciler.expire_notified(Utc::now()).await.unwrap();

    let next = h.services.reservations.get(second.reservation.id).await.unwrap();
    assert_eq!(next.status, ReservationStatus::Notified);
    assert_eq!(next.allocated_copy_id, Some(copies[0]));
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Hold);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_borrows_of_single_copy() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (book, copies) = h.book(1).await;

    let (a, b) = tokio::join!(
        h.services.borrows.create(by_book(u1, book)),
        h.services.borrows.create(by_book(u2, book)),
    );

    let (winner, loser) = match (a, b) {
        (Ok(w), Err(l)) | (Err(l), Ok(w)) => (w, l),
        (a, b) => panic!("expected exactly one winner, got {:?} and {:?}", a.is_ok(), b.is_ok()),
    };
    assert_eq!(winner.copy_id, copies[0]);
    assert!(matches!(loser, AppError::LicenseTaken(_)), "unexpected error: {}", loser);
    assert_eq!(active_borrows_of_copy(&h, copies[0]).await, 1);
    assert_ledger_consistent(&h, book).await;
}

#[tokio::test]
#[ignore]
async fn test_late_borrow_of_taken_book_is_license_taken() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (book, _) = h.book(1).await;

    h.services.borrows.create(by_book(u1, book)).await.unwrap();
    let err = h.services.borrows.create(by_book(u2, book)).await.unwrap_err();
    assert!(matches!(err, AppError::LicenseTaken(_)), "unexpected error: {}", err);
    assert!(err.is_user_retryable());
}

#[tokio::test]
#[ignore]
async fn test_concurrent_borrows_get_distinct_copies() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (book, _) = h.book(2).await;

    let (a, b) = tokio::join!(
        h.services.borrows.create(by_book(u1, book)),
        h.services.borrows.create(by_book(u2, book)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.copy_id, b.copy_id);
    assert_ledger_consistent(&h, book).await;
}

#[tokio::test]
#[ignore]
async fn test_concurrent_claims_of_preferred_copy() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (_, copies) = h.book(1).await;

    let (a, b) = tokio::join!(
        h.services.borrows.create(by_copy(u1, copies[0])),
        h.services.borrows.create(by_copy(u2, copies[0])),
    );

    let loser = match (a, b) {
        (Ok(_), Err(l)) | (Err(l), Ok(_)) => l,
        (a, b) => panic!("expected exactly one winner, got {:?} and {:?}", a.is_ok(), b.is_ok()),
    };
    assert!(matches!(loser, AppError::LicenseTaken(_)), "unexpected error: {}", loser);
    assert!(loser.is_user_retryable());
    assert_eq!(active_borrows_of_copy(&h, copies[0]).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_borrowed_preferred_copy_is_license_taken() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (_, copies) = h.book(2).await;

    h.services.borrows.create(by_copy(u1, copies[0])).await.unwrap();
    let err = h.services.borrows.create(by_copy(u2, copies[0])).await.unwrap_err();
    assert!(matches!(err, AppError::LicenseTaken(_)));

    // Nothing was written for the loser
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM borrows WHERE user_id = $1")
        .bind(u2)
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[ignore]
async fn test_borrow_quota_exceeded() {
    let h = harness().await;
    let role = h.role(14, 2, 48).await;
    let user = h.user(role).await;
    let (book, copies) = h.book(3).await;

    h.services.borrows.create(by_book(user, book)).await.unwrap();
    h.services.borrows.create(by_book(user, book)).await.unwrap();

    let err = h.services.borrows.create(by_book(user, book)).await.unwrap_err();
    match err {
        AppError::QuotaExceeded { details, .. } => {
            assert_eq!(details["max_borrow_book"], 2);
            assert_eq!(details["active_borrows"], 2);
        }
        other => panic!("expected QuotaExceeded, got {}", other),
    }
    assert_eq!(copy_status(&h, book, copies[2]).await, CopyStatus::Available);
}

#[tokio::test]
#[ignore]
async fn test_borrow_input_errors() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let user = h.user(role).await;
    let (book, _) = h.book(0).await;
    let (_, other_copies) = h.book(1).await;

    let neither = CreateBorrow {
        user_id: user,
        target: CopyTarget {
            book_id: None,
            copy_id: None,
        },
    };
    assert!(matches!(
        h.services.borrows.create(neither).await,
        Err(AppError::BadRequest(_))
    ));

    assert!(matches!(
        h.services.borrows.create(by_book(user, book)).await,
        Err(AppError::NotFound(_))
    ));

    let mismatched = CreateBorrow {
        user_id: user,
        target: CopyTarget {
            book_id: Some(book),
            copy_id: Some(other_copies[0]),
        },
    };
    assert!(matches!(
        h.services.borrows.create(mismatched).await,
        Err(AppError::BadRequest(_))
    ));

    assert!(matches!(
        h.services.borrows.create(by_book(i32::MAX, book)).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore]
async fn test_return_errors() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (book, copies) = h.book(1).await;

    let borrow = h.services.borrows.create(by_book(u1, book)).await.unwrap();

    assert!(matches!(
        h.services.borrows.return_borrow(borrow.id, u2).await,
        Err(AppError::Forbidden(_))
    ));

    h.services.borrows.return_borrow(borrow.id, u1).await.unwrap();
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Available);

    assert!(matches!(
        h.services.borrows.return_borrow(borrow.id, u1).await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        h.services.borrows.return_borrow(i32::MAX, u1).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore]
async fn test_queue_is_first_come_first_served() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let owner = h.user(role).await;
    let waiters = [h.user(role).await, h.user(role).await, h.user(role).await];
    let (book, copies) = h.book(1).await;

    let borrow = h.services.borrows.create(by_book(owner, book)).await.unwrap();

    let mut reservations = Vec::new();
    for (i, user) in waiters.iter().enumerate() {
        let enrollment = h.services.reservations.enroll(*user, book).await.unwrap();
        assert_eq!(enrollment.queue_position, i as i64 + 1);
        reservations.push(enrollment.reservation.id);
    }

    let position = h.services.reservations.position(reservations[1]).await.unwrap();
    assert_eq!(position.queue_position, Some(2));
    assert_eq!(position.total_waiting, Some(3));

    h.services.borrows.return_borrow(borrow.id, owner).await.unwrap();

    let head = h.services.reservations.get(reservations[0]).await.unwrap();
    assert_eq!(head.status, ReservationStatus::Notified);
    for id in &reservations[1..] {
        let r = h.services.reservations.get(*id).await.unwrap();
        assert_eq!(r.status, ReservationStatus::Waiting);
    }

    // Remaining waiters move up
    let position = h.services.reservations.position(reservations[2]).await.unwrap();
    assert_eq!(position.queue_position, Some(2));
    let notified = h.services.reservations.position(reservations[0]).await.unwrap();
    assert_eq!(notified.queue_position, None);

    // Cancelling the hold hands the copy to the next in line
    h.services
        .reservations
        .cancel(reservations[0], waiters[0], Some("changed my mind"))
        .await
        .unwrap();
    let next = h.services.reservations.get(reservations[1]).await.unwrap();
    assert_eq!(next.status, ReservationStatus::Notified);
    assert_eq!(next.allocated_copy_id, Some(copies[0]));
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Hold);
}

#[tokio::test]
#[ignore]
async fn test_fulfill_notified_reservation() {
    let h = harness().await;
    let role = h.role(21, 3, 48).await;
    let (u1, u2, u3) = (h.user(role).await, h.user(role).await, h.user(role).await);
    let (book, copies) = h.book(1).await;

    let borrow = h.services.borrows.create(by_book(u1, book)).await.unwrap();
    let enrollment = h.services.reservations.enroll(u2, book).await.unwrap();

    // Not yet notified
    assert!(matches!(
        h.services.reservations.fulfill(enrollment.reservation.id, u2).await,
        Err(AppError::Conflict(_))
    ));

    h.services.borrows.return_borrow(borrow.id, u1).await.unwrap();

    assert!(matches!(
        h.services.reservations.fulfill(enrollment.reservation.id, u3).await,
        Err(AppError::Forbidden(_))
    ));

    let fulfilled = h.services.reservations.fulfill(enrollment.reservation.id, u2).await.unwrap();
    assert_eq!(fulfilled.user_id, u2);
    assert_eq!(fulfilled.copy_id, copies[0]);
    assert_eq!(fulfilled.due_date - fulfilled.borrow_date, Duration::days(21));
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Borrowed);

    let reservation = h.services.reservations.get(enrollment.reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Fulfilled);
    assert!(reservation.fulfilled_at.is_some());

    assert!(matches!(
        h.services.reservations.fulfill(enrollment.reservation.id, u2).await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
#[ignore]
async fn test_fulfill_rechecks_borrow_quota() {
    let h = harness().await;
    let role = h.role(14, 1, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (book, copies) = h.book(1).await;
    let (other_book, _) = h.book(1).await;

    let borrow = h.services.borrows.create(by_book(u1, book)).await.unwrap();
    let enrollment = h.services.reservations.enroll(u2, book).await.unwrap();
    h.services.borrows.return_borrow(borrow.id, u1).await.unwrap();

    // Quota filled while the hold is pending
    h.services.borrows.create(by_book(u2, other_book)).await.unwrap();

    match h.services.reservations.fulfill(enrollment.reservation.id, u2).await {
        Err(AppError::QuotaExceeded { details, .. }) => {
            assert_eq!(details["max_borrow_book"], 1);
            assert_eq!(details["active_borrows"], 1);
        }
        other => panic!("expected QuotaExceeded, got {:?}", other.map(|b| b.id)),
    }

    let reservation = h.services.reservations.get(enrollment.reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Notified);
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Hold);
    assert_ledger_consistent(&h, book).await;
}

#[tokio::test]
#[ignore]
async fn test_fulfill_after_hold_lapsed_is_expired() {
    let _sweeps = sweep_lock().await;
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (book, copies) = h.book(1).await;

    let borrow = h.services.borrows.create(by_book(u1, book)).await.unwrap();
    let enrollment = h.services.reservations.enroll(u2, book).await.unwrap();
    h.services.borrows.return_borrow(borrow.id, u1).await.unwrap();
    backdate_hold(&h, enrollment.reservation.id, Duration::minutes(1)).await;

    let err = h.services.reservations.fulfill(enrollment.reservation.id, u2).await.unwrap_err();
    assert!(matches!(err, AppError::Expired(_)), "unexpected error: {}", err);

    // Left for the expiry sweep
    let reservation = h.services.reservations.get(enrollment.reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Notified);
    assert!(reservation.fulfilled_at.is_none());
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Hold);
    assert_eq!(active_borrows_of_copy(&h, copies[0]).await, 0);

    h.services.reconciler.expire_notified(Utc::now()).await.unwrap();
    let reservation = h.services.reservations.get(enrollment.reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Expired);
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Available);
}

#[tokio::test]
#[ignore]
async fn test_enroll_rejections() {
    let h = harness().await;
    let role = h.role(14, 1, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (book, _) = h.book(1).await;
    let (other_book, _) = h.book(0).await;

    h.services.borrows.create(by_book(u1, book)).await.unwrap();
    assert!(matches!(
        h.services.reservations.enroll(u1, book).await,
        Err(AppError::Conflict(_))
    ));

    h.services.reservations.enroll(u2, book).await.unwrap();
    assert!(matches!(
        h.services.reservations.enroll(u2, book).await,
        Err(AppError::Conflict(_))
    ));

    match h.services.reservations.enroll(u2, other_book).await {
        Err(AppError::QuotaExceeded { details, .. }) => {
            assert_eq!(details["max_reservation_book"], 1);
            assert_eq!(details["active_reservations"], 1);
        }
        other => panic!("expected QuotaExceeded, got {:?}", other.map(|e| e.reservation.id)),
    }

    assert!(matches!(
        h.services.reservations.enroll(u2, i32::MAX).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore]
async fn test_cancel_rules() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (book, _) = h.book(0).await;

    let enrollment = h.services.reservations.enroll(u1, book).await.unwrap();

    assert!(matches!(
        h.services.reservations.cancel(enrollment.reservation.id, u2, None).await,
        Err(AppError::Forbidden(_))
    ));

    let cancelled = h
        .services
        .reservations
        .cancel(enrollment.reservation.id, u1, Some("no longer needed"))
        .await
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("no longer needed"));
    assert!(cancelled.cancelled_at.is_some());

    assert!(matches!(
        h.services.reservations.cancel(enrollment.reservation.id, u1, None).await,
        Err(AppError::Conflict(_))
    ));

    // A cancelled reservation no longer blocks a new one
    h.services.reservations.enroll(u1, book).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_cancel_notified_with_empty_queue_releases_copy() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (book, copies) = h.book(1).await;

    let borrow = h.services.borrows.create(by_book(u1, book)).await.unwrap();
    let enrollment = h.services.reservations.enroll(u2, book).await.unwrap();
    h.services.borrows.return_borrow(borrow.id, u1).await.unwrap();
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Hold);

    let cancelled = h
        .services
        .reservations
        .cancel(enrollment.reservation.id, u2, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Available);
    assert_ledger_consistent(&h, book).await;

    // The released copy is free for anyone
    let borrow = h.services.borrows.create(by_book(u1, book)).await.unwrap();
    assert_eq!(borrow.copy_id, copies[0]);
}

#[tokio::test]
#[ignore]
async fn test_overdue_borrow_auto_returned() {
    let _sweeps = sweep_lock().await;
    let h = harness().await;
    let role = h.role(7, 3, 48).await;
    let (u1, u2) = (h.user(role).await, h.user(role).await);
    let (book, copies) = h.book(1).await;

    let borrow = h.services.borrows.create(by_book(u1, book)).await.unwrap();
    let enrollment = h.services.reservations.enroll(u2, book).await.unwrap();

    backdate_due(&h, borrow.id, Duration::days(1)).await;

    let report = h.services.reconciler.auto_return(Utc::now()).await.unwrap();
    assert!(report.processed_count >= 1);

    let returned = h.services.borrows.get(borrow.id).await.unwrap();
    assert!(returned.return_date.is_some());

    let reservation = h.services.reservations.get(enrollment.reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Notified);
    assert_eq!(copy_status(&h, book, copies[0]).await, CopyStatus::Hold);

    assert_ledger_consistent(&h, book).await;

    // A late manual return finds the borrow closed
    assert!(matches!(
        h.services.borrows.return_borrow(borrow.id, u1).await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
#[ignore]
async fn test_auto_return_collects_item_errors() {
    let _sweeps = sweep_lock().await;
    let h = harness().await;
    let role = h.role(7, 3, 48).await;
    let waiter_role = h.role(7, 3, 48).await;
    let (u1, waiter) = (h.user(role).await, h.user(waiter_role).await);
    let (stuck_book, _) = h.book(1).await;
    let (free_book, _) = h.book(1).await;

    let stuck = h.services.borrows.create(by_book(u1, stuck_book)).await.unwrap();
    h.services.reservations.enroll(waiter, stuck_book).await.unwrap();
    let free = h.services.borrows.create(by_book(u1, free_book)).await.unwrap();

    // Promoting the waiter needs a policy it no longer has
    let policy: (i32, i32, i32) = sqlx::query_as(
        "DELETE FROM policies WHERE role_id = $1 RETURNING max_borrow_days, max_borrow_books, hold_hours",
    )
    .bind(waiter_role)
    .fetch_one(&h.pool)
    .await
    .unwrap();

    backdate_due(&h, stuck.id, Duration::days(1)).await;
    backdate_due(&h, free.id, Duration::days(1)).await;

    let report = h.services.reconciler.auto_return(Utc::now()).await.unwrap();
    assert!(report.processed_count >= 1);
    assert!(
        report.errors.iter().any(|e| e.contains(&format!("borrow {}", stuck.id))),
        "errors: {:?}",
        report.errors
    );

    // The failed item rolled back, the other one went through
    assert!(h.services.borrows.get(stuck.id).await.unwrap().return_date.is_none());
    assert!(h.services.borrows.get(free.id).await.unwrap().return_date.is_some());
    assert_ledger_consistent(&h, stuck_book).await;
    assert_ledger_consistent(&h, free_book).await;

    sqlx::query(
        "INSERT INTO policies (role_id, max_borrow_days, max_borrow_books, hold_hours) VALUES ($1, $2, $3, $4)",
    )
    .bind(waiter_role)
    .bind(policy.0)
    .bind(policy.1)
    .bind(policy.2)
    .execute(&h.pool)
    .await
    .unwrap();

    // The next run picks the failed borrow up again
    let report = h.services.reconciler.auto_return(Utc::now()).await.unwrap();
    assert!(report.errors.iter().all(|e| !e.contains(&format!("borrow {}", stuck.id))));
    assert!(h.services.borrows.get(stuck.id).await.unwrap().return_date.is_some());
    assert_ledger_consistent(&h, stuck_book).await;
}

#[tokio::test]
#[ignore]
async fn test_new_copy_goes_to_waiting_reader() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let user = h.user(role).await;
    let (book, _) = h.book(0).await;

    let enrollment = h.services.reservations.enroll(user, book).await.unwrap();
    assert_eq!(enrollment.available_copies, 0);

    let copy = h.services.copies.add(book, &crate::common::unique("lic")).await.unwrap();
    assert_eq!(copy.status, CopyStatus::Hold);

    let reservation = h.services.reservations.get(enrollment.reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Notified);
    assert_eq!(reservation.allocated_copy_id, Some(copy.id));
}

#[tokio::test]
#[ignore]
async fn test_retire_copy() {
    let h = harness().await;
    let role = h.role(14, 3, 48).await;
    let user = h.user(role).await;
    let (book, copies) = h.book(2).await;

    h.services.borrows.create(by_copy(user, copies[0])).await.unwrap();
    assert!(matches!(
        h.services.copies.retire(copies[0]).await,
        Err(AppError::Conflict(_))
    ));

    let retired = h.services.copies.retire(copies[1]).await.unwrap();
    assert!(retired.retired_at.is_some());
    assert!(matches!(
        h.services.copies.retire(copies[1]).await,
        Err(AppError::Conflict(_))
    ));

    // Retired copies are never allocated; the one left in service is taken
    let other = h.user(role).await;
    assert!(matches!(
        h.services.borrows.create(by_book(other, book)).await,
        Err(AppError::LicenseTaken(_))
    ));

    let duplicate = h.services.copies.add(book, &retired.license_key).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    // Listing still shows the retired copy
    let listed = h.services.copies.list_for_book(book).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().any(|c| c.id == copies[1] && c.retired_at.is_some()));
    assert!(matches!(
        h.services.copies.list_for_book(i32::MAX).await,
        Err(AppError::NotFound(_))
    ));
}
