//! Policy resolution: user -> role -> borrowing policy

use sqlx::PgConnection;

use crate::{
    error::AppResult,
    models::{policy::Policy, user::User},
    repository::Repository,
};

#[derive(Clone)]
pub struct PolicyResolver {
    repository: Repository,
}

impl PolicyResolver {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Resolve a user's current policy
    pub async fn for_user(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<(User, Policy)> {
        let user = self.repository.users.get_by_id(conn, user_id).await?;
        let policy = self.repository.policies.for_role(conn, user.role_id).await?;
        Ok((user, policy))
    }

    /// Resolve a user's policy and lock the user row for the rest of the transaction.
    ///
    /// Quota checks go through here so two requests from the same user cannot
    /// both pass the count before either inserts.
    pub async fn for_user_locked(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<(User, Policy)> {
        let user = self.repository.users.lock_by_id(conn, user_id).await?;
        let policy = self.repository.policies.for_role(conn, user.role_id).await?;
        Ok((user, policy))
    }

    /// All configured policies
    pub async fn list(&self) -> AppResult<Vec<Policy>> {
        self.repository.policies.list().await
    }
}
