//! Database models for guests.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{ChatId, UserId};

/// A guest known to the venue, keyed by the chat identifier the front end
/// reaches them at. Created on first interaction.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: UserId,
    pub chat_id: ChatId,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Database request for creating a guest
#[derive(Debug, Clone, Default)]
pub struct UserCreateDBRequest {
    pub chat_id: ChatId,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
}
