//! # tablectl: Table-Reservation Engine for Venues
//!
//! `tablectl` is the booking core of a venue's reservation system: it takes
//! booking requests, finds an available table matching the party size and
//! time window, tracks each reservation's lifecycle (pending → confirmed /
//! canceled / stopped), and keeps a restart-safe schedule of reminder
//! notifications ahead of every confirmed reservation.
//!
//! ## Overview
//!
//! Venues taking reservations through a chat bot or similar front end need
//! two guarantees from the machinery underneath: the same table is never
//! promised to two parties at once, and a confirmed guest gets exactly one
//! reminder before their slot, even across process restarts. This crate owns
//! those guarantees and nothing else - message parsing, conversational flow,
//! and delivery mechanics stay in the front end, which drives the engine
//! through [`ReservationLifecycle`].
//!
//! ### What It Does
//!
//! A create request is validated against the venue's booking policy (slot
//! grid, minimum advance notice, blocked dates, daily quota), then the
//! availability resolver picks the best-fit table: the smallest free table
//! that seats the party, computed against all pending/confirmed reservations
//! overlapping the requested window under half-open interval semantics. The
//! resolver re-runs inside the insert transaction, so the answer is
//! authoritative at write time. Confirming a reservation registers a
//! reminder timer at `starts_at - lead_time`; canceling or stopping it drops
//! the timer, and a timer that outlives its reservation re-checks persisted
//! state before delivering anything.
//!
//! ## Architecture
//!
//! Persistence is SQLite through SQLx; all instants are UTC. The **database
//! layer** ([`db`]) follows the repository pattern: each entity has a
//! repository struct owning its queries and guarded writes. The **booking
//! core** ([`booking`]) layers policy validation and lifecycle transitions
//! on top. The **reminder scheduler** ([`reminders`]) holds one timer task
//! per confirmed upcoming reservation in an in-memory index that is rebuilt
//! from the database on startup ([`reminders::ReminderScheduler::reconcile`])
//! and periodically resynced as a fallback. Outbound delivery sits behind
//! the [`notify::Notifier`] trait.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use tablectl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = tablectl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     tablectl::telemetry::init_telemetry()?;
//!
//!     // Boots the store, reconciles the reminder schedule, then runs the
//!     // resync daemon until Ctrl+C.
//!     let app = Application::new(config).await?;
//!     app.run(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```
//!
//! ## Database Setup
//!
//! The application runs migrations on startup and seeds the configured table
//! layout into an empty store:
//!
//! ```no_run
//! # use sqlx::SqlitePool;
//! # async fn example(pool: SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
//! tablectl::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod booking;
pub mod clock;
pub mod config;
pub mod db;
pub mod errors;
pub mod notify;
pub mod reminders;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

pub use booking::{CreateBooking, ReservationLifecycle};
pub use config::Config;
pub use errors::{Error, Result};

use crate::clock::SharedClock;
use crate::config::DatabaseConfig;
use crate::db::handlers::Tables;
use crate::db::models::tables::TableSeedDBRequest;
use crate::notify::{BotApiNotifier, LogNotifier, SharedNotifier};
use crate::reminders::ReminderScheduler;

/// Get the tablectl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Open the SQLite pool described by the configuration.
///
/// WAL journaling keeps readers unblocked while a writer holds the lock, and
/// the busy timeout bounds how long a statement waits on that lock before
/// the error surfaces as a transient `DbError::Unavailable`.
async fn connect_pool(database: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let settings = database.pool_settings();
    let options = match database {
        DatabaseConfig::File { path, .. } => SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(settings.busy_timeout)
            .foreign_keys(true),
        DatabaseConfig::Memory => SqliteConnectOptions::new().in_memory(true).foreign_keys(true),
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Seed the venue's table layout into an empty store (run only once).
///
/// Idempotent: a store that already has tables is left alone so manual
/// layout changes survive restarts.
#[instrument(skip_all)]
pub async fn seed_tables(layout: &[config::TableSeed], pool: &SqlitePool) -> anyhow::Result<()> {
    if layout.is_empty() {
        return Ok(());
    }

    let requests: Vec<TableSeedDBRequest> = layout.iter().map(Into::into).collect();
    let mut tx = pool.begin().await?;
    let inserted = Tables::new(&mut tx).seed_if_empty(&requests).await?;
    tx.commit().await?;

    if inserted > 0 {
        info!(inserted, "Seeded venue table layout");
    } else {
        info!("Table layout already present, skipping seeding");
    }
    Ok(())
}

/// Main application struct that owns all resources and lifecycle.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] opens the store, runs migrations,
///    seeds the table layout, and reconciles the reminder schedule from
///    persisted state - synchronously, before anything else may touch the
///    engine, so a restart can never serve traffic with an empty schedule.
/// 2. **Run**: [`Application::run`] starts the scheduler's resync daemon and
///    parks until the shutdown future resolves.
/// 3. **Shutdown**: the cancellation token stops the daemon and every
///    pending timer, then the pool is closed.
pub struct Application {
    pool: SqlitePool,
    lifecycle: ReservationLifecycle,
    scheduler: ReminderScheduler,
    shutdown_token: CancellationToken,
}

impl Application {
    /// Create an application with production collaborators: the system
    /// clock, and the configured bot API notifier (or the log notifier when
    /// none is configured).
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let notifier: SharedNotifier = match &config.notifier {
            Some(notifier_config) => Arc::new(BotApiNotifier::new(notifier_config)?),
            None => {
                info!("No notifier configured, reminders will only be logged");
                Arc::new(LogNotifier)
            }
        };
        Self::with_collaborators(config, clock::system_clock(), notifier).await
    }

    /// Create an application with injected clock and notifier. This is the
    /// seam embedding front ends (and tests) use.
    pub async fn with_collaborators(config: Config, clock: SharedClock, notifier: SharedNotifier) -> anyhow::Result<Self> {
        let pool = connect_pool(&config.database).await?;
        migrator().run(&pool).await?;
        seed_tables(&config.tables, &pool).await?;

        let shutdown_token = CancellationToken::new();
        let scheduler = ReminderScheduler::new(
            pool.clone(),
            config.reminders.clone(),
            config.venue.name.clone(),
            clock.clone(),
            notifier,
            shutdown_token.clone(),
        );

        // Rebuild the schedule from persisted truth before taking traffic
        scheduler.reconcile().await?;

        let lifecycle = ReservationLifecycle::new(pool.clone(), config.booking.clone(), clock, scheduler.clone());

        Ok(Self {
            pool,
            lifecycle,
            scheduler,
            shutdown_token,
        })
    }

    /// The front-end surface: create / confirm / cancel / stop / listings.
    pub fn lifecycle(&self) -> &ReservationLifecycle {
        &self.lifecycle
    }

    /// Run the reminder daemon until the shutdown future resolves.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let daemon = tokio::spawn(self.scheduler.clone().run_daemon());

        shutdown.await;
        info!("Shutdown signal received, stopping reminder daemon...");
        self.shutdown_token.cancel();
        let _ = daemon.await;

        info!("Closing database connections...");
        self.pool.close().await;
        Ok(())
    }
}
