//! Copy allocation: claim one available copy of a book

use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::{borrow::CopyTarget, status::CopyStatus},
    repository::Repository,
};

#[derive(Clone)]
pub struct CopyAllocator {
    repository: Repository,
}

impl CopyAllocator {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Claim a copy for borrowing, moving it Available -> Borrowed.
    ///
    /// The status change is a single conditional update; losing a race to a
    /// concurrent claim, or finding every copy of the book taken, yields
    /// `LicenseTaken` and leaves nothing changed.
    pub async fn claim(&self, conn: &mut PgConnection, target: CopyTarget) -> AppResult<i32> {
        let copy_id = match (target.copy_id, target.book_id) {
            (Some(copy_id), book_id) => {
                let copy = self.repository.copies.get_by_id(conn, copy_id).await?;
                if let Some(book_id) = book_id {
                    if copy.book_id != book_id {
                        return Err(AppError::BadRequest(format!(
                            "Copy {} does not belong to book {}",
                            copy_id, book_id
                        )));
                    }
                }
                copy_id
            }
            (None, Some(book_id)) => {
                self.repository.books.get_short(conn, book_id).await?;
                match self.repository.copies.find_available(conn, book_id).await? {
                    Some(copy_id) => copy_id,
                    None => return Err(self.no_available_copy(conn, book_id).await?),
                }
            }
            (None, None) => {
                return Err(AppError::BadRequest(
                    "Either book_id or copy_id must be provided".to_string(),
                ));
            }
        };

        let claimed = self
            .repository
            .copies
            .transition(conn, copy_id, CopyStatus::Available, CopyStatus::Borrowed)
            .await?;

        if !claimed {
            tracing::warn!(copy_id, "Copy claim lost: copy is no longer available");
            return Err(AppError::LicenseTaken(
                "License was taken by another user".to_string(),
            ));
        }

        tracing::debug!(copy_id, "Copy claimed");
        Ok(copy_id)
    }

    /// Error for a book with no free copy: every copy in service is taken
    /// (`LicenseTaken`), or the book has none at all (`NotFound`).
    async fn no_available_copy(&self, conn: &mut PgConnection, book_id: i32) -> AppResult<AppError> {
        if self.repository.copies.count_in_service(conn, book_id).await? > 0 {
            tracing::warn!(book_id, "Copy claim lost: no copy of the book is available");
            Ok(AppError::LicenseTaken("No available copies of this book".to_string()))
        } else {
            Ok(AppError::NotFound("This book has no copies in service".to_string()))
        }
    }
}
