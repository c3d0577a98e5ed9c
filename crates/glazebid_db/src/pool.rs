//! Database pool creation.
//!
//! The worker coordinates exclusively through SQLite (shared file in
//! multi-worker deployments, `:memory:` in tests). A concrete pool type
//! keeps `#[derive(FromRow)]` fully usable with chrono and enum-backed
//! columns.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

use crate::error::DbError;

/// Database pool type alias.
pub type DbPool = sqlx::SqlitePool;

/// Writers queue behind the database-level lock; give them time to drain
/// rather than failing a claim outright.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL (`sqlite:/path/to/db?mode=rwc`).
    pub url: String,
    /// Maximum connections in the pool.
    pub max_connections: u32,
}

impl DbConfig {
    /// File-backed database.
    pub fn sqlite(path: impl AsRef<str>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref()),
            max_connections: 5,
        }
    }

    /// In-memory database (for testing).
    pub fn sqlite_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    /// Parse a `DATABASE_URL`.
    pub fn from_url(url: impl Into<String>) -> Result<Self, DbError> {
        let url = url.into();
        if !url.starts_with("sqlite:") {
            return Err(DbError::InvalidUrl(url));
        }
        Ok(Self {
            url,
            max_connections: 5,
        })
    }
}

/// Create a connection pool. WAL mode lets reader ticks overlap writer
/// claims from sibling workers on the same file.
pub async fn create_pool(config: &DbConfig) -> Result<DbPool, DbError> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(DbError::Database)?
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .map_err(DbError::Database)?;

    info!("Database pool ready: {}", config.url);
    Ok(pool)
}
