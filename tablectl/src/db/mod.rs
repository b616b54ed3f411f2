//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx over SQLite.
//! It follows the Repository pattern to provide clean abstractions over
//! database operations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ booking /    │  (lifecycle manager, resolver, reminder scheduler)
//! │ reminders    │
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │ Repositories │  (db::handlers - queries & guarded writes)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │   Models     │  (db::models - database records)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │   SQLite     │
//! └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations for each entity
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Transactions
//!
//! Repositories borrow a `SqliteConnection`, so the caller decides whether an
//! operation runs on a plain pooled connection (read-only paths) or inside a
//! transaction (every state-changing path). The availability re-check and the
//! reservation insert MUST share one transaction; SQLite's single-writer
//! model then serializes concurrent check-and-insert attempts, which is what
//! upholds the no-double-booking invariant under concurrency.
//!
//! # Migrations
//!
//! Database migrations are managed by SQLx and located in the `migrations/`
//! directory. [`crate::migrator`] provides access to the migrator.

use std::future::Future;
use std::time::Duration;

pub mod errors;
pub mod handlers;
pub mod models;

use errors::{DbError, Result};

/// Run a read-only operation, retrying with bounded backoff when the store
/// reports itself temporarily unavailable (held write lock, pool timeout).
/// Writes must NOT go through this: a timed-out write may still have applied.
pub async fn with_read_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    const MAX_ATTEMPTS: u32 = 3;

    let mut attempt = 0;
    loop {
        match op().await {
            Err(DbError::Unavailable { message }) if attempt + 1 < MAX_ATTEMPTS => {
                attempt += 1;
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt));
                tracing::warn!(
                    op = op_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "database unavailable, retrying read: {message}"
                );
                tokio::time::sleep(backoff).await;
            }
            other => return other,
        }
    }
}
