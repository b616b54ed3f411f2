//! Database models for venue tables.

use sqlx::FromRow;

use crate::types::TableId;

/// A physical table in the venue. Seeded from configuration at startup and
/// immutable afterwards; the reservation flow never mutates this entity.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DiningTable {
    pub id: TableId,
    pub name: String,
    pub capacity: i64,
}

/// Seed request for a venue table
#[derive(Debug, Clone)]
pub struct TableSeedDBRequest {
    pub name: String,
    pub capacity: i64,
}
