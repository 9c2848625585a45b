//! Borrowing policy endpoints

use axum::{extract::State, Json};

use crate::{error::AppResult, models::policy::Policy, AppState};

use super::AuthenticatedUser;

/// List the borrowing policy of every role
#[utoipa::path(
    get,
    path = "/policies",
    tag = "policies",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Policies", body = Vec<Policy>),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_policies(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Policy>>> {
    claims.require_staff()?;

    let policies = state.services.policies.list().await?;
    Ok(Json(policies))
}
