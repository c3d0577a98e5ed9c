//! Retention queries used by the daily cleanup sweep: stale uploads, old
//! SSOT bodies, and audit-log pruning.

use chrono::{DateTime, Utc};

use crate::error::DbError;
use crate::models::StaleUpload;
use crate::pool::DbPool;

/// Jobs stuck in CREATED/UPLOADING since before the cutoff, joined with
/// their raw-upload blob rows (if any).
pub async fn stale_uploads(
    pool: &DbPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<StaleUpload>, DbError> {
    let rows: Vec<StaleUpload> = sqlx::query_as(
        r#"
        SELECT j.id AS job_id, so.id AS object_id, so.bucket AS bucket, so.key AS key
        FROM jobs j
        LEFT JOIN storage_objects so ON so.job_id = j.id
        WHERE j.status IN ('CREATED', 'UPLOADING')
          AND j.created_at < ?
        LIMIT ?
        "#,
    )
    .bind(cutoff.to_rfc3339())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Blank the SSOT of jobs DONE since before the cutoff. Returns rows
/// affected.
pub async fn clear_old_ssot(pool: &DbPool, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
    let affected = sqlx::query(
        r#"
        UPDATE jobs
        SET ssot = '{}'
        WHERE status = 'DONE'
          AND updated_at < ?
          AND ssot != '{}'
        "#,
    )
    .bind(cutoff.to_rfc3339())
    .execute(pool)
    .await?
    .rows_affected();
    Ok(affected)
}

/// Drop audit entries older than the cutoff. Returns rows affected.
pub async fn delete_old_audit(pool: &DbPool, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
    let affected = sqlx::query("DELETE FROM audit_log WHERE timestamp < ?")
        .bind(cutoff.to_rfc3339())
        .execute(pool)
        .await?
        .rows_affected();
    Ok(affected)
}
