//! Status enumeration tables

use sqlx::{Pool, Postgres};

use crate::{error::AppResult, models::status::StatusCatalog};

/// Read both status tables and build the catalog.
///
/// Called once at startup, after migrations. A missing required row fails
/// startup rather than surfacing later as a broken request.
pub async fn load_catalog(pool: &Pool<Postgres>) -> AppResult<StatusCatalog> {
    let copy_rows = sqlx::query_as::<_, (String, i32)>("SELECT name, id FROM copy_statuses")
        .fetch_all(pool)
        .await?;

    let reservation_rows =
        sqlx::query_as::<_, (String, i32)>("SELECT name, id FROM reservation_statuses")
            .fetch_all(pool)
            .await?;

    StatusCatalog::from_rows(&copy_rows, &reservation_rows)
}
