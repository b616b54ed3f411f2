//! Database repository for reservations.
//!
//! Besides plain CRUD this repository owns the two queries the engine's
//! invariants hang off: the half-open interval overlap search backing the
//! availability resolver, and the guarded status update that makes lifecycle
//! transitions atomic (the `WHERE status IN (...)` clause means a transition
//! either applies from an allowed state or touches nothing).

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::instrument;

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::Repository;
use crate::db::models::reservations::{Reservation, ReservationCreateDBRequest, ReservationStatus};
use crate::types::{ReservationId, TableId, TimeWindow, UserId};

/// Filter for listing reservations
#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    pub user_id: Option<UserId>,
    pub statuses: Option<Vec<ReservationStatus>>,
    /// Keep only reservations still relevant at this instant (`ends_at >= t`)
    pub ends_after: Option<DateTime<Utc>>,
}

impl ReservationFilter {
    pub fn for_user(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id: Some(user_id),
            statuses: None,
            ends_after: Some(now),
        }
    }

    pub fn pending() -> Self {
        Self {
            user_id: None,
            statuses: Some(vec![ReservationStatus::Pending]),
            ends_after: None,
        }
    }
}

/// Database request for a guarded status transition
#[derive(Debug, Clone)]
pub struct ReservationStatusUpdateDBRequest {
    pub new_status: ReservationStatus,
    /// States the row must currently be in for the update to apply
    pub allowed_from: Vec<ReservationStatus>,
}

pub struct Reservations<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> Reservations<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Reservations in the given statuses whose `[starts_at, ends_at)`
    /// interval overlaps `window` and which hold a table assignment.
    /// `table_ids` narrows the search to specific tables when given.
    #[instrument(skip(self, table_ids, statuses), err)]
    pub async fn list_conflicting(
        &mut self,
        table_ids: Option<&[TableId]>,
        window: TimeWindow,
        statuses: &[ReservationStatus],
    ) -> Result<Vec<Reservation>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM reservations WHERE table_id IS NOT NULL AND starts_at < ",
        );
        query.push_bind(window.ends_at);
        query.push(" AND ends_at > ");
        query.push_bind(window.starts_at);

        query.push(" AND status IN (");
        let mut separated = query.separated(", ");
        for status in statuses {
            separated.push_bind(*status);
        }
        query.push(")");

        if let Some(ids) = table_ids {
            query.push(" AND table_id IN (");
            let mut separated = query.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            query.push(")");
        }

        query.push(" ORDER BY starts_at ASC, id ASC");

        let rows = query.build_query_as::<Reservation>().fetch_all(&mut *self.db).await?;
        Ok(rows)
    }

    /// Confirmed reservations that have not started yet; the reminder
    /// scheduler rebuilds its timer index from exactly this set.
    #[instrument(skip(self), err)]
    pub async fn list_confirmed_future(&mut self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations
             WHERE status = ?1 AND starts_at > ?2
             ORDER BY starts_at ASC",
        )
        .bind(ReservationStatus::Confirmed)
        .bind(now)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows)
    }

    /// Count reservations created inside `[from, to)` that still occupy
    /// capacity (pending/confirmed), optionally scoped to one guest. Backs
    /// the daily request limit.
    #[instrument(skip(self), err)]
    pub async fn count_created_between(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        user_id: Option<UserId>,
    ) -> Result<i64> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM reservations WHERE created_at >= ",
        );
        query.push_bind(from);
        query.push(" AND created_at < ");
        query.push_bind(to);
        query.push(" AND status IN (");
        let mut separated = query.separated(", ");
        for status in ReservationStatus::ACTIVE {
            separated.push_bind(status);
        }
        query.push(")");
        if let Some(user_id) = user_id {
            query.push(" AND user_id = ");
            query.push_bind(user_id);
        }

        let count: i64 = query.build_query_scalar().fetch_one(&mut *self.db).await?;
        Ok(count)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Reservations<'c> {
    type CreateRequest = ReservationCreateDBRequest;
    type UpdateRequest = ReservationStatusUpdateDBRequest;
    type Response = Reservation;
    type Id = ReservationId;
    type Filter = ReservationFilter;

    #[instrument(
        skip(self, request),
        fields(user_id = request.user_id, party_size = request.party_size),
        err
    )]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let reservation = sqlx::query_as::<_, Reservation>(
            "INSERT INTO reservations
                 (user_id, table_id, name, phone, party_size, starts_at, ends_at, status, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             RETURNING *",
        )
        .bind(request.user_id)
        .bind(request.table_id)
        .bind(&request.name)
        .bind(&request.phone)
        .bind(request.party_size)
        .bind(request.starts_at)
        .bind(request.ends_at)
        .bind(request.status)
        .bind(&request.comment)
        .bind(request.created_at)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(reservation)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let reservation = sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(reservation)
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM reservations WHERE 1 = 1");

        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ");
            query.push_bind(user_id);
        }
        if let Some(statuses) = &filter.statuses {
            if statuses.is_empty() {
                return Ok(Vec::new());
            }
            query.push(" AND status IN (");
            let mut separated = query.separated(", ");
            for status in statuses {
                separated.push_bind(*status);
            }
            query.push(")");
        }
        if let Some(t) = filter.ends_after {
            query.push(" AND ends_at >= ");
            query.push_bind(t);
        }
        query.push(" ORDER BY starts_at ASC, id ASC");

        let rows = query.build_query_as::<Reservation>().fetch_all(&mut *self.db).await?;
        Ok(rows)
    }

    /// Guarded transition: applies only when the row is currently in one of
    /// `allowed_from`. Returns `DbError::NotFound` when nothing matched; the
    /// caller re-reads to tell a missing row from a disallowed state.
    #[instrument(skip(self, request), fields(new_status = %request.new_status), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        if request.allowed_from.is_empty() {
            return Err(DbError::NotFound);
        }

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE reservations SET status = ");
        query.push_bind(request.new_status);
        query.push(" WHERE id = ");
        query.push_bind(id);
        query.push(" AND status IN (");
        let mut separated = query.separated(", ");
        for status in &request.allowed_from {
            separated.push_bind(*status);
        }
        query.push(") RETURNING *");

        query
            .build_query_as::<Reservation>()
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use sqlx::SqlitePool;

    use crate::db::models::users::UserCreateDBRequest;

    async fn seed_user(pool: &SqlitePool) -> UserId {
        let mut conn = pool.acquire().await.unwrap();
        let mut users = crate::db::handlers::Users::new(&mut conn);
        let user = users
            .ensure(
                &UserCreateDBRequest {
                    chat_id: 7,
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();

        // a handful of tables for the reservations to point at
        for n in 1..=4 {
            sqlx::query("INSERT INTO dining_tables (name, capacity) VALUES (?1, 4)")
                .bind(format!("T{n}"))
                .execute(&mut *conn)
                .await
                .unwrap();
        }
        user.id
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, hour, minute, 0).unwrap()
    }

    fn request(user_id: UserId, table_id: TableId, start: DateTime<Utc>, status: ReservationStatus) -> ReservationCreateDBRequest {
        ReservationCreateDBRequest {
            user_id,
            table_id: Some(table_id),
            name: "Walk In".to_string(),
            phone: "+100000000".to_string(),
            party_size: 2,
            starts_at: start,
            ends_at: start + Duration::hours(2),
            status,
            comment: None,
            created_at: at(8, 0),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn overlap_search_uses_half_open_intervals(pool: SqlitePool) {
        let user_id = seed_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Reservations::new(&mut conn);

        // 18:00-20:00 confirmed, 20:00-22:00 pending (back-to-back)
        repo.create(&request(user_id, 1, at(18, 0), ReservationStatus::Confirmed))
            .await
            .unwrap();
        repo.create(&request(user_id, 2, at(20, 0), ReservationStatus::Pending))
            .await
            .unwrap();
        // canceled rows never conflict
        repo.create(&request(user_id, 3, at(18, 0), ReservationStatus::Canceled))
            .await
            .unwrap();

        let window = TimeWindow::new(at(19, 0), at(21, 0));
        let conflicts = repo
            .list_conflicting(None, window, &ReservationStatus::ACTIVE)
            .await
            .unwrap();
        let tables: Vec<_> = conflicts.iter().map(|r| r.table_id.unwrap()).collect();
        assert_eq!(tables, vec![1, 2]);

        // Touching the 20:00 boundary from below conflicts only with table 1
        let window = TimeWindow::new(at(18, 30), at(20, 0));
        let conflicts = repo
            .list_conflicting(None, window, &ReservationStatus::ACTIVE)
            .await
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].table_id, Some(1));

        // And from above only with table 2
        let window = TimeWindow::new(at(20, 0), at(22, 0));
        let conflicts = repo
            .list_conflicting(None, window, &ReservationStatus::ACTIVE)
            .await
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].table_id, Some(2));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn conflict_search_narrows_to_requested_tables(pool: SqlitePool) {
        let user_id = seed_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Reservations::new(&mut conn);

        repo.create(&request(user_id, 1, at(18, 0), ReservationStatus::Confirmed))
            .await
            .unwrap();
        repo.create(&request(user_id, 2, at(18, 0), ReservationStatus::Confirmed))
            .await
            .unwrap();

        let window = TimeWindow::new(at(18, 0), at(20, 0));
        let conflicts = repo
            .list_conflicting(Some(&[2]), window, &ReservationStatus::ACTIVE)
            .await
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].table_id, Some(2));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn guarded_update_refuses_disallowed_states(pool: SqlitePool) {
        let user_id = seed_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Reservations::new(&mut conn);

        let reservation = repo
            .create(&request(user_id, 1, at(18, 0), ReservationStatus::Pending))
            .await
            .unwrap();

        let confirm = ReservationStatusUpdateDBRequest {
            new_status: ReservationStatus::Confirmed,
            allowed_from: vec![ReservationStatus::Pending],
        };
        let updated = repo.update(reservation.id, &confirm).await.unwrap();
        assert_eq!(updated.status, ReservationStatus::Confirmed);

        // A second confirm finds no pending row to update
        let err = repo.update(reservation.id, &confirm).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));

        // And the row is unchanged
        let current = repo.get_by_id(reservation.id).await.unwrap().unwrap();
        assert_eq!(current.status, ReservationStatus::Confirmed);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn daily_count_scopes_to_user_and_active_statuses(pool: SqlitePool) {
        let user_id = seed_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let other_id = {
            let mut users = crate::db::handlers::Users::new(&mut conn);
            users
                .ensure(
                    &UserCreateDBRequest {
                        chat_id: 8,
                        ..Default::default()
                    },
                    Utc::now(),
                )
                .await
                .unwrap()
                .id
        };

        let mut repo = Reservations::new(&mut conn);
        repo.create(&request(user_id, 1, at(18, 0), ReservationStatus::Pending))
            .await
            .unwrap();
        repo.create(&request(user_id, 2, at(18, 0), ReservationStatus::Canceled))
            .await
            .unwrap();
        repo.create(&request(other_id, 3, at(18, 0), ReservationStatus::Confirmed))
            .await
            .unwrap();

        let day_start = at(0, 0);
        let day_end = day_start + Duration::days(1);
        assert_eq!(
            repo.count_created_between(day_start, day_end, None).await.unwrap(),
            2
        );
        assert_eq!(
            repo.count_created_between(day_start, day_end, Some(user_id)).await.unwrap(),
            1
        );
    }
}
