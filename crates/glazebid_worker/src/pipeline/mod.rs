//! Pipeline stages.
//!
//! Each stage is an idempotent pass: read the SSOT, advance it, persist
//! it with the status transition. Stages keep the job lock while running
//! and the final stage of a claim chain releases it. Failures bubble up
//! to the scheduler, which owns retry and backoff.

pub mod extract;
pub mod generate;
pub mod index;
pub mod price;
pub mod route;

use std::str::FromStr;

use thiserror::Error;

use glazebid_db::models::Job;
use glazebid_db::DbError;
use glazebid_protocol::{JobStatus, Ssot};

use crate::pdf::PdfError;
use crate::renderer::RenderError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error("render failed: {0}")]
    Render(String),

    #[error("invalid job row: {0}")]
    BadJob(String),

    #[error("artifact generation failed: {0}")]
    Generator(String),
}

impl From<RenderError> for StageError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::Db(e) => StageError::Db(e),
            RenderError::Storage(e) => StageError::Storage(e),
            RenderError::Pdf(e) => StageError::Pdf(e),
            RenderError::Encode(e) => StageError::Render(e.to_string()),
        }
    }
}

impl StageError {
    /// Stable code recorded on the job row when retries are exhausted.
    pub fn code(&self) -> &'static str {
        match self {
            StageError::Db(_) => "DB_ERROR",
            StageError::Storage(_) => "STORAGE_ERROR",
            StageError::Pdf(_) => "PDF_ERROR",
            StageError::Render(_) => "RENDER_ERROR",
            StageError::BadJob(_) => "BAD_JOB",
            StageError::Generator(_) => "GENERATOR_ERROR",
        }
    }
}

/// In-memory view of a claimed job, refreshed from the row between
/// stages.
#[derive(Debug, Clone)]
pub struct JobState {
    pub id: String,
    pub project_id: String,
    pub status: JobStatus,
    pub ssot: Ssot,
    pub retry_count: i64,
    pub max_retries: i64,
}

impl JobState {
    pub fn from_row(job: &Job) -> Result<Self, StageError> {
        let status = JobStatus::from_str(&job.status).map_err(StageError::BadJob)?;
        let ssot = parse_ssot(&job.ssot)?;
        Ok(JobState {
            id: job.id.clone(),
            project_id: job.project_id.clone(),
            status,
            ssot,
            retry_count: job.retry_count,
            max_retries: job.max_retries,
        })
    }

    /// Apply a fresh `(status, ssot)` pair read from the row.
    pub fn refresh(&mut self, status: &str, ssot: &str) -> Result<(), StageError> {
        self.status = JobStatus::from_str(status).map_err(StageError::BadJob)?;
        self.ssot = parse_ssot(ssot)?;
        Ok(())
    }
}

fn parse_ssot(raw: &str) -> Result<Ssot, StageError> {
    if raw.trim().is_empty() {
        return Ok(Ssot::default());
    }
    serde_json::from_str(raw).map_err(|e| StageError::BadJob(format!("unparseable ssot: {e}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures for stage tests: a context over the fake PDF engine, the
    //! in-memory object store and a minimal schema.

    use std::sync::Arc;

    use sqlx::sqlite::SqlitePoolOptions;

    use crate::config::Config;
    use crate::context::WorkerContext;
    use crate::pdf::{FakePage, FakePdfEngine};
    use crate::storage::MemoryStore;

    pub async fn test_context(pages: Vec<FakePage>) -> (WorkerContext, Arc<MemoryStore>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::from_env();
        config.temp_dir = tmp.path().to_path_buf();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        create_schema(&pool).await;

        let store = Arc::new(MemoryStore::new());
        let ctx = WorkerContext::new(
            config,
            pool,
            store.clone(),
            Arc::new(FakePdfEngine::new(pages)),
        );
        (ctx, store, tmp)
    }

    pub async fn create_schema(pool: &sqlx::SqlitePool) {
        for ddl in [
            r#"
            CREATE TABLE jobs (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL DEFAULT 'p1',
                status TEXT NOT NULL,
                ssot TEXT NOT NULL DEFAULT '{}',
                stage_progress TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                locked_at TEXT,
                locked_by TEXT,
                next_run_at TEXT,
                error_code TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL DEFAULT ''
            )
            "#,
            r#"
            CREATE TABLE render_requests (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                page_num INTEGER NOT NULL,
                kind TEXT NOT NULL,
                dpi INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                output_key TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                UNIQUE (job_id, page_num, kind)
            )
            "#,
            r#"
            CREATE TABLE storage_objects (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                sha256 TEXT,
                content_type TEXT,
                ttl_policy TEXT,
                expires_at TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE measurement_tasks (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                dimension_key TEXT NOT NULL,
                status TEXT NOT NULL,
                page_num INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE pricebook_versions (
                id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                effective_date TEXT,
                notes TEXT
            )
            "#,
            r#"
            CREATE TABLE pricing_rules (
                id TEXT PRIMARY KEY,
                pricebook_version_id TEXT NOT NULL,
                name TEXT NOT NULL,
                category TEXT,
                formula_json TEXT,
                applies_to TEXT,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
        ] {
            sqlx::query(ddl).execute(pool).await.unwrap();
        }
    }

    pub async fn insert_job(pool: &sqlx::SqlitePool, id: &str, status: &str, ssot: &str) {
        sqlx::query("INSERT INTO jobs (id, status, ssot, created_at) VALUES (?, ?, ?, '2024-01-01T00:00:00+00:00')")
            .bind(id)
            .bind(status)
            .bind(ssot)
            .execute(pool)
            .await
            .unwrap();
    }

    pub async fn job_row(pool: &sqlx::SqlitePool, id: &str) -> (String, String) {
        sqlx::query_as("SELECT status, ssot FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }
}
