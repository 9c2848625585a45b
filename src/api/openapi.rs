//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{borrows, copies, health, jobs, policies, reservations};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lendwise API",
        version = "1.0.0",
        description = "Library copy allocation and reservation queue REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Borrows
        borrows::list_borrows,
        borrows::get_borrow,
        borrows::create_borrow,
        borrows::return_borrow,
        // Reservations
        reservations::list_reservations,
        reservations::get_reservation,
        reservations::create_reservation,
        reservations::get_position,
        reservations::fulfill_reservation,
        reservations::cancel_reservation,
        // Copies
        copies::list_copies,
        copies::add_copy,
        copies::retire_copy,
        // Policies
        policies::list_policies,
        // Jobs
        jobs::auto_return,
        jobs::expire_notified,
    ),
    components(
        schemas(
            // Borrows
            borrows::CreateBorrowRequest,
            borrows::ReturnBorrowRequest,
            crate::models::borrow::BorrowRecord,
            crate::models::borrow::BorrowDetails,
            crate::models::book::BookShort,
            // Reservations
            reservations::CreateReservationRequest,
            reservations::FulfillReservationRequest,
            crate::models::reservation::Reservation,
            crate::models::reservation::Enrollment,
            crate::models::reservation::QueuePosition,
            crate::models::reservation::CancelReservation,
            crate::models::status::ReservationStatus,
            // Copies
            crate::models::copy::BookCopy,
            crate::models::copy::CreateCopy,
            crate::models::status::CopyStatus,
            // Policies
            crate::models::policy::Policy,
            // Jobs
            jobs::JobResponse,
            crate::services::reconciler::SweepReport,
            crate::services::reconciler::SweepTotal,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "borrows", description = "Borrow ledger"),
        (name = "reservations", description = "Reservation queue"),
        (name = "copies", description = "Copy administration"),
        (name = "policies", description = "Borrowing policies"),
        (name = "jobs", description = "Overdue and hold expiry sweeps")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
