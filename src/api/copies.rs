//! Copy administration endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::copy::{BookCopy, CreateCopy},
    AppState,
};

use super::AuthenticatedUser;

/// List the copies of a book
#[utoipa::path(
    get,
    path = "/books/{id}/copies",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Copies of the book", body = Vec<BookCopy>),
        (status = 404, description = "Book not found")
    )
)]
pub async fn list_copies(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Vec<BookCopy>>> {
    let copies = state.services.copies.list_for_book(book_id).await?;
    Ok(Json(copies))
}

/// Add a copy to a book
#[utoipa::path(
    post,
    path = "/books/{id}/copies",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = CreateCopy,
    responses(
        (status = 201, description = "Copy added", body = BookCopy),
        (status = 403, description = "Staff only"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "License key already in use")
    )
)]
pub async fn add_copy(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
    Json(request): Json<CreateCopy>,
) -> AppResult<(StatusCode, Json<BookCopy>)> {
    claims.require_staff()?;
    request.validate()?;

    let copy = state.services.copies.add(book_id, &request.license_key).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

/// Retire an available copy
#[utoipa::path(
    delete,
    path = "/copies/{id}",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Copy ID")),
    responses(
        (status = 200, description = "Copy retired", body = BookCopy),
        (status = 403, description = "Staff only"),
        (status = 404, description = "Copy not found"),
        (status = 409, description = "Copy is borrowed, held or already retired")
    )
)]
pub async fn retire_copy(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BookCopy>> {
    claims.require_staff()?;

    let copy = state.services.copies.retire(id).await?;
    Ok(Json(copy))
}
