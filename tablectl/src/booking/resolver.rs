//! Best-fit table selection for a requested window.

use std::collections::HashSet;

use sqlx::SqliteConnection;
use tracing::instrument;

use crate::db::errors::Result;
use crate::db::handlers::{Reservations, Tables};
use crate::db::models::reservations::ReservationStatus;
use crate::db::models::tables::DiningTable;
use crate::types::{TableId, TimeWindow};

/// Pure-read search for the smallest free table that seats a party.
///
/// The search is advisory on its own: between this read and a subsequent
/// insert another writer may take the table. The lifecycle manager therefore
/// runs it again on the same connection inside the create transaction, which
/// SQLite's single-writer model serializes.
pub struct AvailabilityResolver<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> AvailabilityResolver<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Find the best-fit table for `party_size` in `window`.
    ///
    /// Best fit means: among tables with `capacity >= party_size` not
    /// occupied by a pending/confirmed reservation overlapping the window,
    /// the one with the smallest capacity, ties broken by smallest id.
    /// Returns `None` when every candidate is taken.
    #[instrument(skip(self), err)]
    pub async fn find_table(&mut self, party_size: i64, window: TimeWindow) -> Result<Option<DiningTable>> {
        let occupied: HashSet<TableId> = Reservations::new(&mut *self.db)
            .list_conflicting(None, window, &ReservationStatus::ACTIVE)
            .await?
            .into_iter()
            .filter_map(|r| r.table_id)
            .collect();

        let candidates = Tables::new(&mut *self.db).list_by_min_capacity(party_size).await?;

        Ok(candidates.into_iter().find(|t| !occupied.contains(&t.id)))
    }
}
