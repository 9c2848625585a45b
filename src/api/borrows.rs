//! Borrow endpoints

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
    models::borrow::{BorrowDetails, BorrowQuery, CopyTarget, CreateBorrow},
    AppState,
};

use super::AuthenticatedUser;

/// Create borrow request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBorrowRequest {
    /// Borrower (staff only, defaults to the caller)
    pub user_id: Option<i32>,
    /// Borrow any available copy of this book
    #[validate(range(min = 1))]
    pub book_id: Option<i32>,
    /// Borrow this specific copy
    #[validate(range(min = 1))]
    pub copy_id: Option<i32>,
}

/// Return borrow request
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReturnBorrowRequest {
    /// Borrower (staff only, defaults to the caller)
    pub user_id: Option<i32>,
}

/// List borrows
#[utoipa::path(
    get,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(BorrowQuery),
    responses(
        (status = 200, description = "Borrows", body = Vec<BorrowDetails>)
    )
)]
pub async fn list_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(mut query): Query<BorrowQuery>,
) -> AppResult<Json<Vec<BorrowDetails>>> {
    if !claims.is_staff() {
        query.user_id = Some(claims.acting_user(query.user_id)?);
    }

    let borrows = state.services.borrows.list(&query).await?;
    Ok(Json(borrows))
}

/// Get one borrow
#[utoipa::path(
    get,
    path = "/borrows/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow ID")),
    responses(
        (status = 200, description = "Borrow", body = BorrowDetails),
        (status = 404, description = "Borrow not found")
    )
)]
pub async fn get_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowDetails>> {
    let borrow = state.services.borrows.get(id).await?;
    claims.acting_user(Some(borrow.user_id))?;
    Ok(Json(borrow))
}

/// Borrow a copy of a book
#[utoipa::path(
    post,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = CreateBorrowRequest,
    responses(
        (status = 201, description = "Borrow created", body = BorrowDetails),
        (status = 400, description = "Neither book nor copy given"),
        (status = 404, description = "User, book or copy not found, or the book has no copies"),
        (status = 409, description = "No copy of the book is free (LICENSE_TAKEN)"),
        (status = 422, description = "Borrow quota exceeded (QUOTA_EXCEEDED)")
    )
)]
pub async fn create_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateBorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowDetails>)> {
    request.validate()?;
    claims.require_borrower()?;

    let command = CreateBorrow {
        user_id: claims.acting_user(request.user_id)?,
        target: CopyTarget {
            book_id: request.book_id,
            copy_id: request.copy_id,
        },
    };

    let borrow = state.services.borrows.create(command).await?;
    Ok((StatusCode::CREATED, Json(borrow)))
}

/// Return a borrowed copy
#[utoipa::path(
    post,
    path = "/borrows/{id}/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow ID")),
    request_body = ReturnBorrowRequest,
    responses(
        (status = 200, description = "Copy returned", body = BorrowDetails),
        (status = 403, description = "Not the borrower"),
        (status = 404, description = "Borrow not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    request: Option<Json<ReturnBorrowRequest>>,
) -> AppResult<Json<BorrowDetails>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let user_id = claims.acting_user(request.user_id)?;

    let borrow = state.services.borrows.return_borrow(id, user_id).await?;
    Ok(Json(borrow))
}
