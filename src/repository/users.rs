//! Users repository (read-only view of the user store)

use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::user::User,
};

#[derive(Clone, Default)]
pub struct UsersRepository;

impl UsersRepository {
    pub fn new() -> Self {
        Self
    }

    /// Get user by ID
    pub async fn get_by_id(&self, conn: &mut PgConnection, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT id, login, role_id FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Get user by ID and lock the row until the transaction ends.
    ///
    /// Serializes quota checks for the same user across concurrent requests.
    pub async fn lock_by_id(&self, conn: &mut PgConnection, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT id, login, role_id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }
}
