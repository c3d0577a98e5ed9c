//! Glazebid pipeline worker.
//!
//! A long-lived process that polls the shared database for two kinds of
//! work: page render requests (high priority, small) and main bid jobs
//! (lower priority, staged). Stages are idempotent read-modify-write
//! passes over the job's SSOT document; the database lock row is the only
//! coordination mechanism between sibling workers.

pub mod cleanup;
pub mod config;
pub mod context;
pub mod disk;
pub mod generators;
pub mod pdf;
pub mod pipeline;
pub mod renderer;
pub mod scheduler;
pub mod storage;

pub use config::Config;
pub use context::WorkerContext;
