//! Database models for reservations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{ReservationId, TableId, TimeWindow, UserId};

/// Lifecycle state of a reservation.
///
/// Transitions are one-directional: `pending → confirmed`, `pending →
/// canceled`, `confirmed → canceled`, `confirmed → stopped`. `canceled` and
/// `stopped` are terminal. Reservations in a terminal state are excluded
/// from overlap checks and from the reminder schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Canceled,
    Stopped,
}

impl ReservationStatus {
    /// Statuses that occupy a table for overlap purposes.
    pub const ACTIVE: [ReservationStatus; 2] = [ReservationStatus::Pending, ReservationStatus::Confirmed];

    pub fn is_terminal(self) -> bool {
        matches!(self, ReservationStatus::Canceled | ReservationStatus::Stopped)
    }

    pub fn can_transition_to(self, to: ReservationStatus) -> bool {
        matches!(
            (self, to),
            (ReservationStatus::Pending, ReservationStatus::Confirmed)
                | (ReservationStatus::Pending, ReservationStatus::Canceled)
                | (ReservationStatus::Confirmed, ReservationStatus::Canceled)
                | (ReservationStatus::Confirmed, ReservationStatus::Stopped)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Canceled => "canceled",
            ReservationStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reservation row. `table_id` is assigned at creation time by the
/// availability resolver; the column stays nullable so a cleared assignment
/// can be represented, but the engine always writes one.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub table_id: Option<TableId>,
    pub name: String,
    pub phone: String,
    pub party_size: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: ReservationStatus,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.starts_at, self.ends_at)
    }
}

/// Database request for creating a reservation
#[derive(Debug, Clone)]
pub struct ReservationCreateDBRequest {
    pub user_id: UserId,
    pub table_id: Option<TableId>,
    pub name: String,
    pub phone: String,
    pub party_size: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: ReservationStatus,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
