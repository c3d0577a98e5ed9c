//! Data layer for the Glazebid worker.
//!
//! All coordination between workers happens through these tables; there is
//! no side channel. Every public operation is a single statement (or a
//! single guarded statement) so that N workers can run them concurrently
//! against the shared database without an external lock service. The
//! schema itself is owned by the platform's migration tool; this crate
//! only reads and writes the columns it names, so extra columns are
//! harmless.

pub mod error;
pub mod heartbeats;
pub mod jobs;
pub mod measurements;
pub mod models;
pub mod pool;
pub mod pricebook;
pub mod renders;
pub mod retention;
pub mod storage_objects;

#[cfg(test)]
pub(crate) mod testing;

pub use error::DbError;
pub use pool::{create_pool, DbConfig, DbPool};

/// How long a lock is honored before any worker may reclaim the job.
pub const LOCK_HORIZON_MINUTES: i64 = 10;
