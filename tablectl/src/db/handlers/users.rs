//! Database repository for guests.

use chrono::{DateTime, Utc};
use sqlx::{Connection, SqliteConnection};
use tracing::instrument;

use crate::db::errors::Result;
use crate::db::models::users::{User, UserCreateDBRequest};
use crate::types::{ChatId, UserId};

pub struct Users<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: UserId) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_chat(&mut self, chat_id: ChatId) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE chat_id = ?1")
            .bind(chat_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    /// Return the guest for this chat id, creating the row on first contact.
    #[instrument(skip(self, request), fields(chat_id = request.chat_id), err)]
    pub async fn ensure(&mut self, request: &UserCreateDBRequest, now: DateTime<Utc>) -> Result<User> {
        if let Some(user) = self.get_by_chat(request.chat_id).await? {
            return Ok(user);
        }

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (chat_id, first_name, last_name, username, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING *",
        )
        .bind(request.chat_id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.username)
        .bind(now)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(user)
    }

    /// Remove a guest and, transactionally, every reservation they own. This
    /// is the only path on which the engine deletes reservations.
    #[instrument(skip(self), err)]
    pub async fn delete(&mut self, id: UserId) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM reservations WHERE user_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }
}
