//! Borrowing policies repository

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::policy::Policy,
};

#[derive(Clone)]
pub struct PoliciesRepository {
    pool: Pool<Postgres>,
}

impl PoliciesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Policy for a role. A role without a policy is a configuration error.
    pub async fn for_role(&self, conn: &mut PgConnection, role_id: i32) -> AppResult<Policy> {
        sqlx::query_as::<_, Policy>("SELECT * FROM policies WHERE role_id = $1")
            .bind(role_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| {
                AppError::Configuration(format!("No borrow policy configured for role {}", role_id))
            })
    }

    /// List all policies
    pub async fn list(&self) -> AppResult<Vec<Policy>> {
        let policies = sqlx::query_as::<_, Policy>("SELECT * FROM policies ORDER BY role_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(policies)
    }
}
