//! Main job queue: claim, status transitions, retry bookkeeping.
//!
//! The claim is one guarded UPDATE with a RETURNING clause: the subquery
//! picks the oldest eligible row and the write re-evaluates eligibility,
//! so under N concurrent workers at most one statement can move a given
//! row inside the lock horizon. A worker that dies simply leaves
//! `locked_at` to age out; after the horizon any worker may reclaim.

use chrono::{Duration, Utc};
use serde_json::Value;
use sqlx::QueryBuilder;
use tracing::info;

use glazebid_protocol::{JobStatus, Ssot};

use crate::error::DbError;
use crate::models::Job;
use crate::pool::DbPool;
use crate::LOCK_HORIZON_MINUTES;

/// Optional fields for [`update_job_status`]. `clear_lock` defaults to
/// true; intra-stage progress updates pass false to retain ownership.
#[derive(Debug, Default)]
pub struct StatusUpdate<'a> {
    pub stage_progress: Option<&'a Value>,
    pub ssot: Option<&'a Ssot>,
    pub error_code: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub keep_lock: bool,
}

impl<'a> StatusUpdate<'a> {
    /// Progress update that keeps the worker's lock.
    pub fn keeping_lock() -> Self {
        StatusUpdate {
            keep_lock: true,
            ..Default::default()
        }
    }
}

/// Claim the oldest eligible job for this worker.
///
/// Eligible: claimable status, lock absent or stale, backoff elapsed.
/// Returns `None` when there is no work or the race was lost.
pub async fn claim_main_job(pool: &DbPool, worker_id: &str) -> Result<Option<Job>, DbError> {
    let now = Utc::now();
    let now_s = now.to_rfc3339();
    let horizon = (now - Duration::minutes(LOCK_HORIZON_MINUTES)).to_rfc3339();

    let job: Option<Job> = sqlx::query_as(
        r#"
        UPDATE jobs
        SET locked_at = ?, locked_by = ?
        WHERE id = (
            SELECT id FROM jobs
            WHERE status IN ('UPLOADED', 'REVIEWED', 'PRICED')
              AND (locked_at IS NULL OR locked_at < ?)
              AND (next_run_at IS NULL OR next_run_at <= ?)
            ORDER BY created_at ASC
            LIMIT 1
        )
          AND (locked_at IS NULL OR locked_at < ?)
        RETURNING id, project_id, status, ssot, stage_progress,
                  retry_count, max_retries, locked_at, locked_by
        "#,
    )
    .bind(&now_s)
    .bind(worker_id)
    .bind(&horizon)
    .bind(&now_s)
    .bind(&horizon)
    .fetch_optional(pool)
    .await?;

    if let Some(job) = &job {
        info!("Claimed job {} ({}) as {}", job.id, job.status, worker_id);
    }
    Ok(job)
}

/// Transition a job's status, optionally updating SSOT, progress and
/// error columns in the same statement.
pub async fn update_job_status(
    pool: &DbPool,
    job_id: &str,
    new_status: JobStatus,
    update: StatusUpdate<'_>,
) -> Result<(), DbError> {
    let mut qb = QueryBuilder::<sqlx::Sqlite>::new("UPDATE jobs SET status = ");
    qb.push_bind(new_status.as_str());
    qb.push(", updated_at = ");
    qb.push_bind(Utc::now().to_rfc3339());

    if !update.keep_lock {
        qb.push(", locked_at = NULL, locked_by = NULL");
    }
    if let Some(progress) = update.stage_progress {
        qb.push(", stage_progress = ");
        qb.push_bind(progress.to_string());
    }
    if let Some(ssot) = update.ssot {
        let json = serde_json::to_string(ssot).map_err(|source| DbError::BadJson {
            column: "ssot",
            source,
        })?;
        qb.push(", ssot = ");
        qb.push_bind(json);
    }
    if let Some(code) = update.error_code {
        qb.push(", error_code = ");
        qb.push_bind(code);
    }
    if let Some(message) = update.error_message {
        qb.push(", error_message = ");
        qb.push_bind(message);
    }

    qb.push(" WHERE id = ");
    qb.push_bind(job_id);
    qb.build().execute(pool).await?;
    Ok(())
}

/// Schedule a retry: bump the counter, set the backoff deadline, release
/// the lock. One statement, so a crash cannot half-apply it.
pub async fn increment_retry(
    pool: &DbPool,
    job_id: &str,
    backoff_seconds: i64,
) -> Result<(), DbError> {
    let next_run = (Utc::now() + Duration::seconds(backoff_seconds)).to_rfc3339();
    sqlx::query(
        r#"
        UPDATE jobs
        SET retry_count = retry_count + 1,
            next_run_at = ?,
            locked_at = NULL,
            locked_by = NULL
        WHERE id = ?
        "#,
    )
    .bind(&next_run)
    .bind(job_id)
    .execute(pool)
    .await?;
    info!("Job {} scheduled for retry in {}s", job_id, backoff_seconds);
    Ok(())
}

/// Terminal failure; clears the lock via the default status update path.
pub async fn mark_job_failed(
    pool: &DbPool,
    job_id: &str,
    error_message: &str,
    error_code: &str,
) -> Result<(), DbError> {
    update_job_status(
        pool,
        job_id,
        JobStatus::Failed,
        StatusUpdate {
            error_message: Some(error_message),
            error_code: Some(error_code),
            ..Default::default()
        },
    )
    .await
}

/// Re-read status and SSOT between stages; stages persist their outputs
/// to the row, not to the in-memory job.
pub async fn refresh_job(
    pool: &DbPool,
    job_id: &str,
) -> Result<Option<(String, String)>, DbError> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT status, ssot FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(pool)
            .await?;
    Ok(row)
}

/// Project id of a job, for key fallbacks when no storage-object row
/// recorded the source upload.
pub async fn job_project_id(pool: &DbPool, job_id: &str) -> Result<Option<String>, DbError> {
    let project_id: Option<String> = sqlx::query_scalar("SELECT project_id FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;
    Ok(project_id)
}

/// Ids of all currently locked jobs, stale or not. Used at startup to
/// decide which temp directories are orphans.
pub async fn locked_job_ids(pool: &DbPool) -> Result<Vec<String>, DbError> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM jobs WHERE locked_at IS NOT NULL")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}
