//! Common type definitions shared across the engine.
//!
//! All entity IDs are 64-bit row IDs wrapped in type aliases for readability:
//!
//! - [`TableId`]: venue table identifier
//! - [`UserId`]: guest account identifier
//! - [`ReservationId`]: reservation identifier
//! - [`ChatId`]: the external chat identifier a guest is reached at
//!
//! [`TimeWindow`] is the half-open `[starts_at, ends_at)` interval used by
//! every overlap query.

use chrono::{DateTime, Utc};

// Type aliases for IDs
pub type TableId = i64;
pub type UserId = i64;
pub type ReservationId = i64;

/// External chat identifier; owned by the messaging platform, not by us.
pub type ChatId = i64;

/// A half-open UTC interval `[starts_at, ends_at)`.
///
/// Two windows overlap iff `a.starts_at < b.ends_at && a.ends_at >
/// b.starts_at`; touching endpoints do not overlap, so back-to-back bookings
/// on the same table are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        Self { starts_at, ends_at }
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.starts_at < other.ends_at && self.ends_at > other.starts_at
    }
}
