use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error as ThisError;

use crate::db::errors::DbError;
use crate::db::models::reservations::ReservationStatus;
use crate::types::ReservationId;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Party size must be a positive integer
    #[error("party size must be at least 1 (got {party_size})")]
    InvalidPartySize { party_size: i64 },

    /// Requested start does not land on the venue's slot grid
    #[error("requested time {requested} is not aligned to the {slot} slot grid")]
    MisalignedSlot {
        requested: DateTime<Utc>,
        slot: humantime::Duration,
    },

    /// Request arrived inside the minimum-advance window
    #[error("reservations require at least {min_advance} advance notice")]
    InsufficientNotice { min_advance: humantime::Duration },

    /// Same-day booking is disabled for this venue
    #[error("same-day reservations are not accepted")]
    SameDayNotAllowed,

    /// The venue has closed this date for bookings
    #[error("reservations are not accepted on {date}")]
    BlockedDate { date: NaiveDate },

    /// The venue-wide or per-guest daily request quota is exhausted
    #[error("the daily reservation limit of {limit} has been reached")]
    DailyLimitReached { limit: u32 },

    /// No free table can seat the party in the requested window
    #[error("no table seating {party_size} is free in the requested window")]
    NoTableAvailable { party_size: i64 },

    /// Status change not allowed from the reservation's current state
    #[error("reservation cannot move from {from} to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: &'static str, id: i64 },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn reservation_not_found(id: ReservationId) -> Self {
        Error::NotFound {
            resource: "reservation",
            id,
        }
    }

    /// Whether the caller may usefully retry the same request later without
    /// changing it (storage hiccup rather than a rejected request).
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Database(DbError::Unavailable { .. }))
    }
}

/// Type alias for engine operation results
pub type Result<T> = std::result::Result<T, Error>;
