//! Reservation queue endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        borrow::BorrowDetails,
        reservation::{CancelReservation, Enrollment, QueuePosition, Reservation, ReservationQuery},
    },
    AppState,
};

use super::AuthenticatedUser;

/// Enroll request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReservationRequest {
    /// Reserving user (staff only, defaults to the caller)
    pub user_id: Option<i32>,
    #[validate(range(min = 1))]
    pub book_id: i32,
}

/// Fulfill request
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct FulfillReservationRequest {
    /// Reservation owner (staff only, defaults to the caller)
    pub user_id: Option<i32>,
}

/// List reservations
#[utoipa::path(
    get,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(ReservationQuery),
    responses(
        (status = 200, description = "Reservations", body = Vec<Reservation>)
    )
)]
pub async fn list_reservations(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(mut query): Query<ReservationQuery>,
) -> AppResult<Json<Vec<Reservation>>> {
    if !claims.is_staff() {
        query.user_id = Some(claims.acting_user(query.user_id)?);
    }

    let reservations = state.services.reservations.list(&query).await?;
    Ok(Json(reservations))
}

/// Get one reservation
#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation", body = Reservation),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Reservation>> {
    let reservation = state.services.reservations.get(id).await?;
    claims.acting_user(Some(reservation.user_id))?;
    Ok(Json(reservation))
}

/// Join the waiting queue for a book
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = CreateReservationRequest,
    responses(
        (status = 201, description = "Reservation created", body = Enrollment),
        (status = 404, description = "User or book not found"),
        (status = 409, description = "Already reserved or already borrowed"),
        (status = 422, description = "Reservation quota exceeded (QUOTA_EXCEEDED)")
    )
)]
pub async fn create_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateReservationRequest>,
) -> AppResult<(StatusCode, Json<Enrollment>)> {
    request.validate()?;
    claims.require_borrower()?;
    let user_id = claims.acting_user(request.user_id)?;

    let enrollment = state.services.reservations.enroll(user_id, request.book_id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// Current queue position of a reservation
#[utoipa::path(
    get,
    path = "/reservations/{id}/position",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Queue position", body = QueuePosition),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_position(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<QueuePosition>> {
    let reservation = state.services.reservations.get(id).await?;
    claims.acting_user(Some(reservation.user_id))?;

    let position = state.services.reservations.position(id).await?;
    Ok(Json(position))
}

/// Turn a notified reservation into a borrow of the held copy
#[utoipa::path(
    post,
    path = "/reservations/{id}/fulfill",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    request_body = FulfillReservationRequest,
    responses(
        (status = 200, description = "Borrow created from the hold", body = BorrowDetails),
        (status = 403, description = "Not the reservation owner"),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "Reservation not in the notified state"),
        (status = 410, description = "Hold expired (EXPIRED)"),
        (status = 422, description = "Borrow quota exceeded (QUOTA_EXCEEDED)")
    )
)]
pub async fn fulfill_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    request: Option<Json<FulfillReservationRequest>>,
) -> AppResult<Json<BorrowDetails>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    claims.require_borrower()?;
    let user_id = claims.acting_user(request.user_id)?;

    let borrow = state.services.reservations.fulfill(id, user_id).await?;
    Ok(Json(borrow))
}

/// Cancel a waiting or notified reservation
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    request_body = CancelReservation,
    responses(
        (status = 200, description = "Reservation cancelled", body = Reservation),
        (status = 403, description = "Not the reservation owner"),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "Reservation already closed")
    )
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    request: Option<Json<CancelReservation>>,
) -> AppResult<Json<Reservation>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;
    let user_id = claims.acting_user(request.user_id)?;

    let reservation = state
        .services
        .reservations
        .cancel(id, user_id, request.reason.as_deref())
        .await?;
    Ok(Json(reservation))
}
