//! Repository layer for database operations
//!
//! Methods that take a `&mut PgConnection` run inside the caller's transaction;
//! methods without one read straight from the pool.

pub mod books;
pub mod borrows;
pub mod copies;
pub mod policies;
pub mod reservations;
pub mod statuses;
pub mod users;

use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::models::status::StatusCatalog;

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub catalog: Arc<StatusCatalog>,
    pub users: users::UsersRepository,
    pub policies: policies::PoliciesRepository,
    pub books: books::BooksRepository,
    pub copies: copies::CopiesRepository,
    pub borrows: borrows::BorrowsRepository,
    pub reservations: reservations::ReservationsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool and resolved status catalog
    pub fn new(pool: Pool<Postgres>, catalog: StatusCatalog) -> Self {
        let catalog = Arc::new(catalog);
        Self {
            users: users::UsersRepository::new(),
            policies: policies::PoliciesRepository::new(pool.clone()),
            books: books::BooksRepository::new(),
            copies: copies::CopiesRepository::new(catalog.clone()),
            borrows: borrows::BorrowsRepository::new(pool.clone()),
            reservations: reservations::ReservationsRepository::new(pool.clone(), catalog.clone()),
            catalog,
            pool,
        }
    }

    /// Load the status catalog and build the repository
    pub async fn connect(pool: Pool<Postgres>) -> crate::error::AppResult<Self> {
        let catalog = statuses::load_catalog(&pool).await?;
        Ok(Self::new(pool, catalog))
    }
}
