//! Error types for the data layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// Connectivity and statement failures. Propagated to the caller so
    /// the outer poll loop can decide to sleep and retry.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A unique or check constraint rejected the write.
    #[error("Conflicting write: {0}")]
    Conflict(sqlx::Error),

    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid JSON in column {column}: {source}")]
    BadJson {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        let is_constraint = e
            .as_database_error()
            .map(|d| d.is_unique_violation() || d.is_check_violation())
            .unwrap_or(false);
        if is_constraint {
            DbError::Conflict(e)
        } else {
            DbError::Database(e)
        }
    }
}
