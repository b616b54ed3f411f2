//! Reservation lifecycle management.
//!
//! Every state a reservation can be in, and every way it can change state,
//! goes through [`ReservationLifecycle`]. Create requests pass the booking
//! policy first, then the availability resolver runs INSIDE the insert
//! transaction so the chosen table is still free when the row lands.
//! Transitions use the repository's guarded update, so a change either
//! applies from an allowed state or writes nothing.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use crate::booking::resolver::AvailabilityResolver;
use crate::clock::SharedClock;
use crate::config::{BookingConfig, LimitScope};
use crate::db::errors::DbError;
use crate::db::handlers::reservations::{ReservationFilter, ReservationStatusUpdateDBRequest};
use crate::db::handlers::{Repository, Reservations, Users};
use crate::db::models::reservations::{Reservation, ReservationCreateDBRequest, ReservationStatus};
use crate::db::models::users::UserCreateDBRequest;
use crate::errors::{Error, Result};
use crate::reminders::ReminderScheduler;
use crate::types::{ReservationId, TimeWindow, UserId};

/// A booking request as the front end hands it over.
#[derive(Debug, Clone)]
pub struct CreateBooking {
    /// Who is asking; the guest row is created on first contact
    pub guest: UserCreateDBRequest,
    pub party_size: i64,
    /// Requested start; must land on the venue's slot grid
    pub starts_at: DateTime<Utc>,
    /// Name the booking is held under
    pub name: String,
    pub phone: String,
    pub comment: Option<String>,
}

/// Front-end surface of the engine: create, confirm, cancel, stop, and the
/// two listings admins and guests see.
#[derive(Clone)]
pub struct ReservationLifecycle {
    pool: SqlitePool,
    booking: BookingConfig,
    clock: SharedClock,
    scheduler: ReminderScheduler,
}

impl ReservationLifecycle {
    pub fn new(pool: SqlitePool, booking: BookingConfig, clock: SharedClock, scheduler: ReminderScheduler) -> Self {
        Self {
            pool,
            booking,
            clock,
            scheduler,
        }
    }

    /// Create a reservation for the requested window.
    ///
    /// On success the reservation is `pending` (or `confirmed` directly when
    /// the party is small enough for the auto-confirm threshold, in which
    /// case its reminder is registered here too).
    #[instrument(skip(self, request), fields(chat_id = request.guest.chat_id, party_size = request.party_size), err)]
    pub async fn create(&self, request: &CreateBooking) -> Result<Reservation> {
        let now = self.clock.now();
        self.validate_window(request, now)?;

        let ends_at = request.starts_at + self.booking.duration_chrono();
        let window = TimeWindow::new(request.starts_at, ends_at);

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let user = Users::new(&mut tx).ensure(&request.guest, now).await?;
        self.check_daily_limit(&mut tx, user.id, now).await?;

        let table = AvailabilityResolver::new(&mut tx)
            .find_table(request.party_size, window)
            .await?
            .ok_or(Error::NoTableAvailable {
                party_size: request.party_size,
            })?;

        let auto_confirm = self
            .booking
            .auto_confirm_max_party
            .is_some_and(|max| request.party_size <= max);
        let status = if auto_confirm {
            ReservationStatus::Confirmed
        } else {
            ReservationStatus::Pending
        };

        let reservation = Reservations::new(&mut tx)
            .create(&ReservationCreateDBRequest {
                user_id: user.id,
                table_id: Some(table.id),
                name: request.name.clone(),
                phone: request.phone.clone(),
                party_size: request.party_size,
                starts_at: request.starts_at,
                ends_at,
                status,
                comment: request.comment.clone(),
                created_at: now,
            })
            .await?;

        tx.commit().await.map_err(DbError::from)?;

        tracing::info!(
            reservation_id = reservation.id,
            table = %table.name,
            status = %reservation.status,
            starts_at = %reservation.starts_at,
            "reservation created"
        );

        if auto_confirm {
            self.scheduler.register(&reservation).await;
        }
        Ok(reservation)
    }

    /// Confirm a pending reservation and register its reminder.
    #[instrument(skip(self), err)]
    pub async fn confirm(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = self
            .transition(id, ReservationStatus::Confirmed, &[ReservationStatus::Pending])
            .await?;
        self.scheduler.register(&reservation).await;
        Ok(reservation)
    }

    /// Cancel a pending or confirmed reservation and drop its reminder.
    #[instrument(skip(self), err)]
    pub async fn cancel(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = self
            .transition(
                id,
                ReservationStatus::Canceled,
                &[ReservationStatus::Pending, ReservationStatus::Confirmed],
            )
            .await?;
        self.scheduler.cancel(id).await;
        Ok(reservation)
    }

    /// Stop a confirmed reservation (the venue closed it out) and drop its
    /// reminder.
    #[instrument(skip(self), err)]
    pub async fn stop(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = self
            .transition(id, ReservationStatus::Stopped, &[ReservationStatus::Confirmed])
            .await?;
        self.scheduler.cancel(id).await;
        Ok(reservation)
    }

    /// A guest's reservations that have not ended yet, soonest first.
    #[instrument(skip(self), err)]
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Reservation>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        let rows = Reservations::new(&mut conn)
            .list(&ReservationFilter::for_user(user_id, self.clock.now()))
            .await?;
        Ok(rows)
    }

    /// Everything awaiting an admin decision, soonest first.
    #[instrument(skip(self), err)]
    pub async fn list_pending(&self) -> Result<Vec<Reservation>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        let rows = Reservations::new(&mut conn).list(&ReservationFilter::pending()).await?;
        Ok(rows)
    }

    /// Apply a guarded transition, mapping the repository's "nothing
    /// matched" into NotFound or InvalidTransition by re-reading the row.
    async fn transition(
        &self,
        id: ReservationId,
        to: ReservationStatus,
        allowed_from: &[ReservationStatus],
    ) -> Result<Reservation> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        let mut repo = Reservations::new(&mut conn);

        let update = ReservationStatusUpdateDBRequest {
            new_status: to,
            allowed_from: allowed_from.to_vec(),
        };
        match repo.update(id, &update).await {
            Ok(reservation) => {
                tracing::info!(reservation_id = id, status = %to, "reservation transitioned");
                Ok(reservation)
            }
            Err(DbError::NotFound) => match repo.get_by_id(id).await? {
                Some(current) => Err(Error::InvalidTransition {
                    from: current.status,
                    to,
                }),
                None => Err(Error::reservation_not_found(id)),
            },
            Err(e) => Err(e.into()),
        }
    }

    fn validate_window(&self, request: &CreateBooking, now: DateTime<Utc>) -> Result<()> {
        if request.party_size < 1 {
            return Err(Error::InvalidPartySize {
                party_size: request.party_size,
            });
        }

        let step_secs = self.booking.slot_step.as_secs() as i64;
        if request.starts_at.timestamp() % step_secs != 0 || request.starts_at.timestamp_subsec_nanos() != 0 {
            return Err(Error::MisalignedSlot {
                requested: request.starts_at,
                slot: self.booking.slot_step.into(),
            });
        }

        if request.starts_at < now + self.booking.min_advance_chrono() {
            return Err(Error::InsufficientNotice {
                min_advance: self.booking.min_advance.into(),
            });
        }

        if !self.booking.allow_same_day && request.starts_at.date_naive() == now.date_naive() {
            return Err(Error::SameDayNotAllowed);
        }

        let date = request.starts_at.date_naive();
        if self.booking.blocked_dates.contains(&date) {
            return Err(Error::BlockedDate { date });
        }

        Ok(())
    }

    /// Enforce the configured cap on requests per UTC day, counting rows
    /// created today that still hold capacity.
    async fn check_daily_limit(
        &self,
        tx: &mut sqlx::SqliteConnection,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(limit) = &self.booking.daily_limit else {
            return Ok(());
        };

        let day_start = now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc();
        let day_end = day_start + chrono::Duration::days(1);
        let scope_user = match limit.scope {
            LimitScope::Global => None,
            LimitScope::PerUser => Some(user_id),
        };

        let created = Reservations::new(tx)
            .count_created_between(day_start, day_end, scope_user)
            .await?;
        if created >= i64::from(limit.count) {
            return Err(Error::DailyLimitReached { limit: limit.count });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::{Duration as ChronoDuration, TimeZone};
    use sqlx::SqlitePool;
    use tokio_util::sync::CancellationToken;

    use crate::config::{DailyLimit, ReminderConfig};
    use crate::db::handlers::Tables;
    use crate::db::models::tables::TableSeedDBRequest;
    use crate::test_utils::{ManualClock, RecordingNotifier};
    use crate::types::ChatId;

    struct Harness {
        pool: SqlitePool,
        lifecycle: ReservationLifecycle,
        scheduler: ReminderScheduler,
        clock: Arc<ManualClock>,
        notifier: Arc<RecordingNotifier>,
    }

    /// Clock starts at 2026-09-01 12:00 UTC; tables are T1(2), T2(4),
    /// T3(4), T4(6).
    async fn harness_with(pool: SqlitePool, booking: BookingConfig) -> Harness {
        {
            let mut conn = pool.acquire().await.unwrap();
            let layout: Vec<_> = [("T1", 2), ("T2", 4), ("T3", 4), ("T4", 6)]
                .into_iter()
                .map(|(name, capacity)| TableSeedDBRequest {
                    name: name.to_string(),
                    capacity,
                })
                .collect();
            Tables::new(&mut conn).seed_if_empty(&layout).await.unwrap();
        }

        let clock = Arc::new(ManualClock::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = ReminderScheduler::new(
            pool.clone(),
            ReminderConfig::default(),
            "Corner Bistro".to_string(),
            clock.clone(),
            notifier.clone(),
            CancellationToken::new(),
        );
        let lifecycle = ReservationLifecycle::new(pool.clone(), booking, clock.clone(), scheduler.clone());
        Harness {
            pool,
            lifecycle,
            scheduler,
            clock,
            notifier,
        }
    }

    async fn harness(pool: SqlitePool) -> Harness {
        harness_with(pool, BookingConfig::default()).await
    }

    fn request(chat_id: ChatId, party_size: i64, starts_at: DateTime<Utc>) -> CreateBooking {
        CreateBooking {
            guest: UserCreateDBRequest {
                chat_id,
                first_name: "Guest".to_string(),
                ..Default::default()
            },
            party_size,
            starts_at,
            name: "Guest Booking".to_string(),
            phone: "+1000000000".to_string(),
            comment: None,
        }
    }

    /// 18:00 UTC on the day after the harness clock's date.
    fn tomorrow_evening() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 2, 18, 0, 0).unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn create_assigns_best_fit_and_persists_pending(pool: SqlitePool) {
        let h = harness(pool).await;

        let reservation = h.lifecycle.create(&request(1, 3, tomorrow_evening())).await.unwrap();

        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.table_id, Some(2), "T2 is the smallest table seating 3");
        assert_eq!(reservation.starts_at, tomorrow_evening());
        assert_eq!(reservation.ends_at, tomorrow_evening() + ChronoDuration::hours(2));
        assert_eq!(h.scheduler.scheduled_count().await, 0, "pending bookings get no reminder");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn create_rejects_short_notice_regardless_of_availability(pool: SqlitePool) {
        let h = harness(pool).await;

        // every table is free, but the request is only 2h out
        let starts_at = h.clock.now() + ChronoDuration::hours(2);
        let err = h.lifecycle.create(&request(1, 2, starts_at)).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientNotice { .. }), "got {err}");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn create_rejects_misaligned_slot(pool: SqlitePool) {
        let h = harness(pool).await;

        let starts_at = Utc.with_ymd_and_hms(2026, 9, 2, 18, 10, 0).unwrap();
        let err = h.lifecycle.create(&request(1, 2, starts_at)).await.unwrap_err();
        assert!(matches!(err, Error::MisalignedSlot { .. }), "got {err}");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn create_rejects_nonpositive_party(pool: SqlitePool) {
        let h = harness(pool).await;
        let err = h.lifecycle.create(&request(1, 0, tomorrow_evening())).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPartySize { party_size: 0 }), "got {err}");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn same_day_requests_honor_the_flag(pool: SqlitePool) {
        let mut booking = BookingConfig::default();
        booking.min_advance = StdDuration::from_secs(60 * 60);
        booking.allow_same_day = false;
        let h = harness_with(pool, booking).await;

        // 18:00 today clears the 1h notice but falls on the current day
        let today = Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 0).unwrap();
        let err = h.lifecycle.create(&request(1, 2, today)).await.unwrap_err();
        assert!(matches!(err, Error::SameDayNotAllowed), "got {err}");

        h.lifecycle.create(&request(1, 2, tomorrow_evening())).await.unwrap();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn blocked_dates_are_rejected(pool: SqlitePool) {
        let mut booking = BookingConfig::default();
        booking.blocked_dates = vec![tomorrow_evening().date_naive()];
        let h = harness_with(pool, booking).await;

        let err = h.lifecycle.create(&request(1, 2, tomorrow_evening())).await.unwrap_err();
        assert!(matches!(err, Error::BlockedDate { .. }), "got {err}");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn global_daily_limit_caps_requests(pool: SqlitePool) {
        let mut booking = BookingConfig::default();
        booking.daily_limit = Some(DailyLimit {
            count: 2,
            scope: LimitScope::Global,
        });
        let h = harness_with(pool, booking).await;

        h.lifecycle.create(&request(1, 2, tomorrow_evening())).await.unwrap();
        h.lifecycle
            .create(&request(2, 2, tomorrow_evening() + ChronoDuration::hours(3)))
            .await
            .unwrap();
        let err = h
            .lifecycle
            .create(&request(3, 2, tomorrow_evening() + ChronoDuration::days(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DailyLimitReached { limit: 2 }), "got {err}");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn per_user_daily_limit_scopes_to_the_guest(pool: SqlitePool) {
        let mut booking = BookingConfig::default();
        booking.daily_limit = Some(DailyLimit {
            count: 1,
            scope: LimitScope::PerUser,
        });
        let h = harness_with(pool, booking).await;

        h.lifecycle.create(&request(1, 2, tomorrow_evening())).await.unwrap();
        let err = h
            .lifecycle
            .create(&request(1, 2, tomorrow_evening() + ChronoDuration::hours(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DailyLimitReached { limit: 1 }), "got {err}");

        // a different guest is unaffected
        h.lifecycle
            .create(&request(2, 2, tomorrow_evening() + ChronoDuration::hours(3)))
            .await
            .unwrap();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn create_fails_when_every_fitting_table_is_taken(pool: SqlitePool) {
        let h = harness(pool).await;

        for chat_id in 1..=4 {
            h.lifecycle.create(&request(chat_id, 1, tomorrow_evening())).await.unwrap();
        }
        let err = h.lifecycle.create(&request(5, 1, tomorrow_evening())).await.unwrap_err();
        assert!(matches!(err, Error::NoTableAvailable { party_size: 1 }), "got {err}");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn back_to_back_bookings_reuse_the_table(pool: SqlitePool) {
        let h = harness(pool).await;

        // only T4 seats 6, and both requests want it
        let first = h.lifecycle.create(&request(1, 6, tomorrow_evening())).await.unwrap();
        let second = h
            .lifecycle
            .create(&request(2, 6, tomorrow_evening() + ChronoDuration::hours(2)))
            .await
            .unwrap();
        assert_eq!(first.table_id, second.table_id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn confirm_registers_exactly_one_reminder(pool: SqlitePool) {
        let h = harness(pool).await;

        let reservation = h.lifecycle.create(&request(1, 2, tomorrow_evening())).await.unwrap();
        let confirmed = h.lifecycle.confirm(reservation.id).await.unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);
        assert_eq!(h.scheduler.scheduled_count().await, 1);

        let err = h.lifecycle.confirm(reservation.id).await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::InvalidTransition {
                    from: ReservationStatus::Confirmed,
                    to: ReservationStatus::Confirmed,
                }
            ),
            "got {err}"
        );
        assert_eq!(h.scheduler.scheduled_count().await, 1, "failed confirm must not add timers");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn confirm_unknown_reservation_is_not_found(pool: SqlitePool) {
        let h = harness(pool).await;
        let err = h.lifecycle.confirm(4242).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { id: 4242, .. }), "got {err}");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn double_cancel_fails_and_leaves_state_untouched(pool: SqlitePool) {
        let h = harness(pool).await;

        let reservation = h.lifecycle.create(&request(1, 2, tomorrow_evening())).await.unwrap();
        let canceled = h.lifecycle.cancel(reservation.id).await.unwrap();
        assert_eq!(canceled.status, ReservationStatus::Canceled);

        let err = h.lifecycle.cancel(reservation.id).await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::InvalidTransition {
                    from: ReservationStatus::Canceled,
                    ..
                }
            ),
            "got {err}"
        );

        let mut conn = h.pool.acquire().await.unwrap();
        let current = Reservations::new(&mut conn).get_by_id(reservation.id).await.unwrap().unwrap();
        assert_eq!(current, canceled, "the failed second cancel wrote nothing");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn stop_is_only_reachable_from_confirmed(pool: SqlitePool) {
        let h = harness(pool).await;

        let reservation = h.lifecycle.create(&request(1, 2, tomorrow_evening())).await.unwrap();
        let err = h.lifecycle.stop(reservation.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }), "got {err}");

        h.lifecycle.confirm(reservation.id).await.unwrap();
        assert_eq!(h.scheduler.scheduled_count().await, 1);

        let stopped = h.lifecycle.stop(reservation.id).await.unwrap();
        assert_eq!(stopped.status, ReservationStatus::Stopped);
        assert_eq!(h.scheduler.scheduled_count().await, 0, "stopping drops the reminder");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn cancel_after_confirm_drops_the_reminder(pool: SqlitePool) {
        let h = harness(pool).await;

        let reservation = h.lifecycle.create(&request(1, 2, tomorrow_evening())).await.unwrap();
        h.lifecycle.confirm(reservation.id).await.unwrap();
        h.lifecycle.cancel(reservation.id).await.unwrap();

        assert_eq!(h.scheduler.scheduled_count().await, 0);
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert!(h.notifier.sent().await.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn small_parties_auto_confirm_when_enabled(pool: SqlitePool) {
        let mut booking = BookingConfig::default();
        booking.auto_confirm_max_party = Some(4);
        let h = harness_with(pool, booking).await;

        let small = h.lifecycle.create(&request(1, 2, tomorrow_evening())).await.unwrap();
        assert_eq!(small.status, ReservationStatus::Confirmed);
        assert_eq!(h.scheduler.scheduled_count().await, 1);

        let large = h
            .lifecycle
            .create(&request(2, 6, tomorrow_evening() + ChronoDuration::hours(3)))
            .await
            .unwrap();
        assert_eq!(large.status, ReservationStatus::Pending);
        assert_eq!(h.scheduler.scheduled_count().await, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn listings_cover_admin_and_guest_views(pool: SqlitePool) {
        let h = harness(pool).await;

        let first = h.lifecycle.create(&request(1, 2, tomorrow_evening())).await.unwrap();
        let later = h
            .lifecycle
            .create(&request(1, 2, tomorrow_evening() + ChronoDuration::hours(3)))
            .await
            .unwrap();
        let other = h
            .lifecycle
            .create(&request(2, 4, tomorrow_evening() + ChronoDuration::hours(3)))
            .await
            .unwrap();
        h.lifecycle.confirm(other.id).await.unwrap();

        let pending = h.lifecycle.list_pending().await.unwrap();
        let pending_ids: Vec<_> = pending.iter().map(|r| r.id).collect();
        assert_eq!(pending_ids, vec![first.id, later.id]);

        let mine = h.lifecycle.list_for_user(first.user_id).await.unwrap();
        let mine_ids: Vec<_> = mine.iter().map(|r| r.id).collect();
        assert_eq!(mine_ids, vec![first.id, later.id]);

        let theirs = h.lifecycle.list_for_user(other.user_id).await.unwrap();
        assert_eq!(theirs.len(), 1);
        assert_eq!(theirs[0].id, other.id);
    }

    /// Sweep a fixed schedule of requests through create and assert the core
    /// invariant directly on the stored rows: no two active reservations on
    /// the same table overlap.
    #[sqlx::test]
    #[test_log::test]
    async fn no_pair_of_active_reservations_overlaps_on_a_table(pool: SqlitePool) {
        let h = harness(pool).await;

        let base = tomorrow_evening() - ChronoDuration::hours(6); // 12:00 next day
        let parties = [2i64, 4, 3, 6, 1, 5, 2, 4, 3, 1];
        let mut accepted = 0;
        for (i, party) in (0..40).zip(parties.into_iter().cycle()) {
            // half-hour offsets spread over two days, deliberately colliding
            let starts_at = base + ChronoDuration::minutes(30 * ((i * 7) % 48) as i64) + ChronoDuration::days(i as i64 % 2);
            match h.lifecycle.create(&request(100 + i as i64, party, starts_at)).await {
                Ok(_) => accepted += 1,
                Err(Error::NoTableAvailable { .. }) => {}
                Err(e) => panic!("unexpected rejection: {e}"),
            }
        }
        assert!(accepted > 10, "the sweep should accept a healthy share of requests");

        let mut conn = h.pool.acquire().await.unwrap();
        let all = Reservations::new(&mut conn)
            .list(&ReservationFilter::default())
            .await
            .unwrap();
        let active: Vec<_> = all.iter().filter(|r| !r.status.is_terminal()).collect();
        for a in &active {
            for b in &active {
                if a.id < b.id && a.table_id == b.table_id {
                    assert!(
                        !a.window().overlaps(&b.window()),
                        "reservations {} and {} overlap on table {:?}",
                        a.id,
                        b.id,
                        a.table_id
                    );
                }
            }
        }
    }
}
