//! Copy and reservation status enumerations and the resolved status catalog

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

// ---------------------------------------------------------------------------
// CopyStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a single copy (license)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum CopyStatus {
    Available,
    Borrowed,
    Hold,
}

impl CopyStatus {
    pub const ALL: [CopyStatus; 3] = [CopyStatus::Available, CopyStatus::Borrowed, CopyStatus::Hold];

    /// Name stored in the `copy_statuses` table
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Available => "Available",
            CopyStatus::Borrowed => "Borrowed",
            CopyStatus::Hold => "Hold",
        }
    }
}

impl std::fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CopyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CopyStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid copy status: {}", s))
    }
}

// ---------------------------------------------------------------------------
// ReservationStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ReservationStatus {
    Waiting,
    Notified,
    Fulfilled,
    Expired,
    Cancelled,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 5] = [
        ReservationStatus::Waiting,
        ReservationStatus::Notified,
        ReservationStatus::Fulfilled,
        ReservationStatus::Expired,
        ReservationStatus::Cancelled,
    ];

    /// Name stored in the `reservation_statuses` table
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Waiting => "Waiting",
            ReservationStatus::Notified => "Notified",
            ReservationStatus::Fulfilled => "Fulfilled",
            ReservationStatus::Expired => "Expired",
            ReservationStatus::Cancelled => "Cancelled",
        }
    }

    /// Waiting and Notified reservations still occupy a queue slot
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Waiting | ReservationStatus::Notified)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReservationStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid reservation status: {}", s))
    }
}

// ---------------------------------------------------------------------------
// StatusCatalog
// ---------------------------------------------------------------------------

/// Status name to row id mapping, resolved once at startup.
///
/// Built from the `copy_statuses` and `reservation_statuses` tables before the
/// server accepts requests and shared read-only afterwards. Every variant of
/// [`CopyStatus`] and [`ReservationStatus`] is guaranteed to have an id.
#[derive(Debug, Clone)]
pub struct StatusCatalog {
    copy: HashMap<CopyStatus, i32>,
    reservation: HashMap<ReservationStatus, i32>,
}

impl StatusCatalog {
    /// Build the catalog from `(name, id)` rows of both status tables.
    ///
    /// Unknown names are ignored; a missing required name is an error.
    pub fn from_rows(copy_rows: &[(String, i32)], reservation_rows: &[(String, i32)]) -> AppResult<Self> {
        let copy_by_name: HashMap<&str, i32> = copy_rows.iter().map(|(n, id)| (n.as_str(), *id)).collect();
        let reservation_by_name: HashMap<&str, i32> =
            reservation_rows.iter().map(|(n, id)| (n.as_str(), *id)).collect();

        let mut copy = HashMap::new();
        for status in CopyStatus::ALL {
            let id = copy_by_name.get(status.as_str()).ok_or_else(|| {
                AppError::Configuration(format!("copy status '{}' is missing from copy_statuses", status))
            })?;
            copy.insert(status, *id);
        }

        let mut reservation = HashMap::new();
        for status in ReservationStatus::ALL {
            let id = reservation_by_name.get(status.as_str()).ok_or_else(|| {
                AppError::Configuration(format!(
                    "reservation status '{}' is missing from reservation_statuses",
                    status
                ))
            })?;
            reservation.insert(status, *id);
        }

        Ok(Self { copy, reservation })
    }

    pub fn copy_id(&self, status: CopyStatus) -> i32 {
        self.copy[&status]
    }

    pub fn reservation_id(&self, status: ReservationStatus) -> i32 {
        self.reservation[&status]
    }

    pub fn copy_status(&self, id: i32) -> AppResult<CopyStatus> {
        self.copy
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| *k)
            .ok_or_else(|| AppError::Internal(format!("unknown copy status id {}", id)))
    }

    pub fn reservation_status(&self, id: i32) -> AppResult<ReservationStatus> {
        self.reservation
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| *k)
            .ok_or_else(|| AppError::Internal(format!("unknown reservation status id {}", id)))
    }

    /// Ids of the Waiting and Notified statuses
    pub fn active_reservation_ids(&self) -> Vec<i32> {
        vec![
            self.reservation_id(ReservationStatus::Waiting),
            self.reservation_id(ReservationStatus::Notified),
        ]
    }
}
