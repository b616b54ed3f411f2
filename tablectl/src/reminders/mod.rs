//! Reminder scheduling for confirmed reservations.
//!
//! The scheduler guarantees one reminder delivery per confirmed reservation
//! at `starts_at - lead_time`. Its timer index is process-local and
//! deliberately not durable: [`ReminderScheduler::reconcile`] rebuilds it
//! from the database, so the schedule is always a function of persisted
//! state rather than in-memory history. A periodic resync loop re-reads
//! persisted truth as a fallback for anything registered or canceled while a
//! write raced the index.
//!
//! The correctness guard against the cancel-vs-elapsed-timer race lives in
//! [`ReminderScheduler::on_fire`]: the reservation is re-read at fire time
//! and anything no longer confirmed is a silent no-op.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::clock::SharedClock;
use crate::config::{ReminderConfig, ShortNoticePolicy};
use crate::db::handlers::{Repository, Reservations, Tables, Users};
use crate::db::models::reservations::{Reservation, ReservationStatus};
use crate::db::with_read_retry;
use crate::errors::Result;
use crate::notify::{ReservationSummary, SharedNotifier};
use crate::types::ReservationId;

/// Background scheduler managing one timer per confirmed reservation.
///
/// Cloning is cheap and shares the timer index; the lifecycle manager and
/// the daemon loop hold clones of the same scheduler.
#[derive(Clone)]
pub struct ReminderScheduler {
    pool: SqlitePool,
    config: ReminderConfig,
    venue_name: String,
    clock: SharedClock,
    notifier: SharedNotifier,
    timers: Arc<RwLock<HashMap<ReservationId, JoinHandle<()>>>>,
    shutdown: CancellationToken,
}

impl ReminderScheduler {
    pub fn new(
        pool: SqlitePool,
        config: ReminderConfig,
        venue_name: String,
        clock: SharedClock,
        notifier: SharedNotifier,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pool,
            config,
            venue_name,
            clock,
            notifier,
            timers: Arc::new(RwLock::new(HashMap::new())),
            shutdown,
        }
    }

    /// Ensure a future reminder firing exists for this reservation.
    ///
    /// Replaces any previously scheduled timer for the same id. A firing
    /// instant already in the past falls under the configured short-notice
    /// policy as long as the reservation itself has not started; a
    /// reservation already underway is skipped outright.
    pub async fn register(&self, reservation: &Reservation) {
        if reservation.status != ReservationStatus::Confirmed {
            tracing::debug!(
                reservation_id = reservation.id,
                status = %reservation.status,
                "not scheduling reminder for non-confirmed reservation"
            );
            return;
        }

        let now = self.clock.now();
        let fire_at = reservation.starts_at - self.config.lead_time_chrono();

        if reservation.starts_at <= now {
            tracing::info!(
                reservation_id = reservation.id,
                starts_at = %reservation.starts_at,
                "reservation already started, reminder skipped"
            );
            return;
        }

        if fire_at <= now {
            match self.config.short_notice {
                ShortNoticePolicy::FireImmediately => {
                    tracing::info!(
                        reservation_id = reservation.id,
                        "confirmation inside the lead window, firing reminder immediately"
                    );
                    self.spawn_timer(reservation.id, Duration::ZERO).await;
                }
                ShortNoticePolicy::Skip => {
                    tracing::info!(
                        reservation_id = reservation.id,
                        "confirmation inside the lead window, reminder skipped by policy"
                    );
                }
            }
            return;
        }

        let delay = (fire_at - now).to_std().unwrap_or(Duration::ZERO);
        tracing::info!(
            reservation_id = reservation.id,
            fire_at = %fire_at,
            delay = %humantime::format_duration(Duration::from_secs(delay.as_secs())),
            "reminder scheduled"
        );
        self.spawn_timer(reservation.id, delay).await;
    }

    async fn spawn_timer(&self, reservation_id: ReservationId, delay: Duration) {
        let scheduler = self.clone();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Err(e) = scheduler.on_fire(reservation_id).await {
                tracing::error!(reservation_id, "reminder firing failed: {e:#}");
            }
        });

        let mut timers = self.timers.write().await;
        if let Some(old) = timers.insert(reservation_id, handle) {
            old.abort();
            tracing::debug!(reservation_id, "replaced previously scheduled reminder");
        }
    }

    /// Drop any pending timer for this reservation. No-op when none exists,
    /// so cancel paths never need to know whether a reminder was scheduled.
    pub async fn cancel(&self, reservation_id: ReservationId) {
        let mut timers = self.timers.write().await;
        if let Some(handle) = timers.remove(&reservation_id) {
            handle.abort();
            tracing::info!(reservation_id, "reminder canceled");
        }
    }

    /// Rebuild the timer index from persisted state: every confirmed future
    /// reservation gets a registration. Run once at startup, before the
    /// process takes traffic, and again by the resync loop as a fallback.
    #[instrument(skip(self), err)]
    pub async fn reconcile(&self) -> Result<usize> {
        let now = self.clock.now();
        let pool = self.pool.clone();
        let upcoming = with_read_retry("list confirmed future reservations", || {
            let pool = pool.clone();
            async move {
                let mut conn = pool.acquire().await?;
                Reservations::new(&mut conn).list_confirmed_future(now).await
            }
        })
        .await?;

        let count = upcoming.len();
        futures::future::join_all(upcoming.iter().map(|reservation| self.register(reservation))).await;
        tracing::info!(count, "reminder schedule reconciled from database");
        Ok(count)
    }

    /// Bring the timer index back in line with the database: schedule
    /// reminders that are missing, drop timers whose reservation is no
    /// longer confirmed and upcoming, and forget finished tasks.
    #[instrument(skip(self), err)]
    pub async fn resync(&self) -> Result<()> {
        let now = self.clock.now();
        let pool = self.pool.clone();
        let upcoming = with_read_retry("list confirmed future reservations", || {
            let pool = pool.clone();
            async move {
                let mut conn = pool.acquire().await?;
                Reservations::new(&mut conn).list_confirmed_future(now).await
            }
        })
        .await?;
        let upcoming_ids: HashSet<ReservationId> = upcoming.iter().map(|r| r.id).collect();

        let (running, stale): (Vec<ReservationId>, Vec<ReservationId>) = {
            let mut timers = self.timers.write().await;
            timers.retain(|_, handle| !handle.is_finished());
            let running = timers.keys().copied().collect();
            let stale = timers
                .keys()
                .copied()
                .filter(|id| !upcoming_ids.contains(id))
                .collect();
            (running, stale)
        };

        for id in stale {
            tracing::info!(reservation_id = id, "dropping timer for no-longer-confirmed reservation");
            self.cancel(id).await;
        }

        let running: HashSet<ReservationId> = running.into_iter().collect();
        for reservation in upcoming.iter().filter(|r| !running.contains(&r.id)) {
            tracing::info!(reservation_id = reservation.id, "scheduling reminder missed by the live index");
            self.register(reservation).await;
        }

        Ok(())
    }

    /// Deliver the reminder for a reservation whose timer elapsed.
    ///
    /// The reservation is re-read first; a row that was canceled or stopped
    /// between scheduling and firing is a no-op, which closes the race
    /// between cancellation and an already-elapsed timer. Notifier failures
    /// are logged and never affect reservation state.
    #[instrument(skip(self), err)]
    pub async fn on_fire(&self, reservation_id: ReservationId) -> Result<()> {
        let pool = self.pool.clone();
        let reservation = with_read_retry("load reservation for firing", || {
            let pool = pool.clone();
            async move {
                let mut conn = pool.acquire().await?;
                Reservations::new(&mut conn).get_by_id(reservation_id).await
            }
        })
        .await?;

        let Some(reservation) = reservation else {
            tracing::warn!(reservation_id, "reminder fired for unknown reservation");
            return Ok(());
        };
        if reservation.status != ReservationStatus::Confirmed {
            tracing::debug!(
                reservation_id,
                status = %reservation.status,
                "reservation no longer confirmed at fire time, reminder dropped"
            );
            return Ok(());
        }
        if reservation.starts_at <= self.clock.now() {
            tracing::debug!(reservation_id, "reservation already started at fire time, reminder dropped");
            return Ok(());
        }

        let mut conn = self.pool.acquire().await.map_err(crate::db::errors::DbError::from)?;
        let Some(user) = Users::new(&mut conn).get_by_id(reservation.user_id).await? else {
            tracing::warn!(
                reservation_id,
                user_id = reservation.user_id,
                "reservation owner missing, reminder dropped"
            );
            return Ok(());
        };
        let table_name = match reservation.table_id {
            Some(table_id) => Tables::new(&mut conn).get_by_id(table_id).await?.map(|t| t.name),
            None => None,
        };
        drop(conn);

        let summary = ReservationSummary {
            reservation_id: reservation.id,
            venue_name: self.venue_name.clone(),
            starts_at: reservation.starts_at,
            table_name,
            party_size: reservation.party_size,
        };

        if let Err(e) = self.notifier.send_reminder(user.chat_id, &summary).await {
            tracing::warn!(reservation_id, chat_id = user.chat_id, "failed to send reminder: {e}");
        } else {
            tracing::info!(reservation_id, chat_id = user.chat_id, "reminder delivered");
        }
        Ok(())
    }

    /// Number of live timers, finished tasks excluded.
    pub async fn scheduled_count(&self) -> usize {
        let timers = self.timers.read().await;
        timers.values().filter(|handle| !handle.is_finished()).count()
    }

    /// Abort every timer. Called on shutdown.
    pub async fn stop_all(&self) {
        let mut timers = self.timers.write().await;
        let count = timers.len();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        if count > 0 {
            tracing::info!(count, "stopped reminder timers");
        }
    }

    /// Run the periodic resync loop until shutdown. The first tick fires
    /// after a full interval; startup reconciliation is the caller's job and
    /// happens before this loop starts.
    pub async fn run_daemon(self) {
        tracing::info!(
            resync_interval = %humantime::format_duration(self.config.resync_interval),
            "reminder scheduler daemon started"
        );

        let mut interval = tokio::time::interval(self.config.resync_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // consume the immediate first tick; reconcile already ran at startup
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("reminder scheduler daemon shutting down");
                    self.stop_all().await;
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.resync().await {
                        tracing::error!("reminder resync failed: {e:#}");
                    }
                }
            }
        }
    }
}
