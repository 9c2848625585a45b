//! On-demand sweep triggers

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, services::reconciler::SweepReport, AppState};

use super::AuthenticatedUser;

/// Sweep result with the job name
#[derive(Debug, Serialize, ToSchema)]
pub struct JobResponse {
    pub job: String,
    #[serde(flatten)]
    pub report: SweepReport,
}

/// Return every overdue borrow now
#[utoipa::path(
    post,
    path = "/jobs/auto-return",
    tag = "jobs",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep report", body = JobResponse),
        (status = 403, description = "Staff only")
    )
)]
pub async fn auto_return(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<JobResponse>> {
    claims.require_staff()?;

    let report = state.services.reconciler.auto_return(Utc::now()).await?;
    Ok(Json(JobResponse {
        job: "auto-return".to_string(),
        report,
    }))
}

/// Expire every lapsed hold now
#[utoipa::path(
    post,
    path = "/jobs/expire-notified",
    tag = "jobs",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep report", body = JobResponse),
        (status = 403, description = "Staff only")
    )
)]
pub async fn expire_notified(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<JobResponse>> {
    claims.require_staff()?;

    let report = state.services.reconciler.expire_notified(Utc::now()).await?;
    Ok(Json(JobResponse {
        job: "expire-notified".to_string(),
        report,
    }))
}
