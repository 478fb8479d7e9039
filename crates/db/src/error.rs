//! Repository errors. Raw `sqlx` errors are classified on the way in so
//! callers can tell "try again later" from "your request is wrong".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// The database could not be reached or the pool is exhausted.
    #[error("database unreachable: {0}")]
    Unreachable(#[source] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("unique constraint {constraint} violated")]
    UniqueViolation { constraint: String },

    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, DbError::Unreachable(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => DbError::Unreachable(err),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => DbError::UniqueViolation {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            other => DbError::Query(other),
        }
    }
}
