use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        message: String,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation {
        constraint: Option<String>,
        message: String,
    },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation {
        constraint: Option<String>,
        message: String,
    },

    /// The store is temporarily unreachable (locked writer, pool timeout).
    /// Callers may retry reads with bounded backoff; writes must be surfaced
    /// as transient failures, never assumed applied.
    #[error("Database temporarily unavailable: {message}")]
    Unavailable { message: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::PoolTimedOut => DbError::Unavailable {
                message: "connection pool timed out".to_string(),
            },
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    DbError::UniqueViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if is_sqlite_busy(db_err.as_ref()) {
                    DbError::Unavailable {
                        message: db_err.message().to_string(),
                    }
                } else {
                    // All other database errors are non-recoverable - convert to anyhow
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// SQLite reports a held write lock as SQLITE_BUSY (5) or SQLITE_LOCKED (6),
/// including their extended forms. Those are transient, not corrupt state.
fn is_sqlite_busy(err: &dyn sqlx::error::DatabaseError) -> bool {
    match err.code().as_deref() {
        Some(code) => {
            let primary = code.parse::<u32>().map(|c| c & 0xff).unwrap_or(0);
            primary == 5 || primary == 6
        }
        None => false,
    }
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;
