//! Database repository for venue tables.

use sqlx::SqliteConnection;
use tracing::instrument;

use crate::db::errors::Result;
use crate::db::models::tables::{DiningTable, TableSeedDBRequest};
use crate::types::TableId;

/// Venue tables are seeded once and never mutated by the reservation flow, so
/// this repository only exposes seeding and read paths.
pub struct Tables<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> Tables<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Insert the configured table layout if the venue has none yet.
    /// Idempotent: a non-empty layout is left untouched so manual changes
    /// survive restarts. Returns the number of tables inserted.
    #[instrument(skip(self, layout), fields(count = layout.len()), err)]
    pub async fn seed_if_empty(&mut self, layout: &[TableSeedDBRequest]) -> Result<usize> {
        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dining_tables")
            .fetch_one(&mut *self.db)
            .await?;
        if existing > 0 {
            return Ok(0);
        }

        for table in layout {
            sqlx::query("INSERT INTO dining_tables (name, capacity) VALUES (?1, ?2)")
                .bind(&table.name)
                .bind(table.capacity)
                .execute(&mut *self.db)
                .await?;
        }
        Ok(layout.len())
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: TableId) -> Result<Option<DiningTable>> {
        let table = sqlx::query_as::<_, DiningTable>("SELECT id, name, capacity FROM dining_tables WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(table)
    }

    /// Candidate tables for a party, smallest first. The id tie-break keeps
    /// selection deterministic when several tables share a capacity.
    #[instrument(skip(self), err)]
    pub async fn list_by_min_capacity(&mut self, party_size: i64) -> Result<Vec<DiningTable>> {
        let tables = sqlx::query_as::<_, DiningTable>(
            "SELECT id, name, capacity FROM dining_tables
             WHERE capacity >= ?1
             ORDER BY capacity ASC, id ASC",
        )
        .bind(party_size)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(tables)
    }
}
