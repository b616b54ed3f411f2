//! Repository implementations for database access.
//!
//! This module provides repository structs for each entity in the system.
//! Repositories follow a consistent pattern:
//!
//! - Wrap a SQLx connection or transaction
//! - Provide strongly-typed operations
//! - Handle query construction and parameter binding
//! - Return domain models from [`crate::db::models`]
//!
//! # Available Repositories
//!
//! - [`Tables`]: venue table seeding and capacity-ordered lookup
//! - [`Users`]: guest accounts keyed by external chat id
//! - [`Reservations`]: reservation CRUD, overlap search, guarded status
//!   transitions
//!
//! # Common Pattern
//!
//! ```ignore
//! use tablectl::db::handlers::{Repository, Reservations};
//!
//! async fn example(pool: &sqlx::SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!     let mut repo = Reservations::new(&mut tx);
//!     // ... operations ...
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

pub mod repository;
pub mod reservations;
pub mod tables;
pub mod users;

pub use repository::Repository;
pub use reservations::Reservations;
pub use tables::Tables;
pub use users::Users;
