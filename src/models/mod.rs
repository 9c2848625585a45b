//! Data models for Lendwise

pub mod book;
pub mod borrow;
pub mod copy;
pub mod policy;
pub mod reservation;
pub mod status;
pub mod user;

// Re-export commonly used types
pub use book::BookShort;
pub use borrow::{BorrowDetails, BorrowRecord};
pub use copy::BookCopy;
pub use policy::Policy;
pub use reservation::Reservation;
pub use status::{CopyStatus, ReservationStatus, StatusCatalog};
pub use user::{User, UserClaims};
