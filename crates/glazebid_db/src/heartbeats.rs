//! Worker heartbeats: one row per worker id, last writer wins.

use chrono::Utc;

use glazebid_protocol::WorkerStatus;

use crate::error::DbError;
use crate::pool::DbPool;

pub async fn upsert_heartbeat(
    pool: &DbPool,
    worker_id: &str,
    status: WorkerStatus,
    current_job_id: Option<&str>,
    memory_usage_mb: Option<f64>,
    disk_usage_pct: Option<f64>,
) -> Result<(), DbError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO worker_heartbeats
            (worker_id, last_heartbeat_at, status, current_job_id,
             memory_usage_mb, disk_usage_pct, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (worker_id) DO UPDATE SET
            last_heartbeat_at = excluded.last_heartbeat_at,
            status = excluded.status,
            current_job_id = excluded.current_job_id,
            memory_usage_mb = excluded.memory_usage_mb,
            disk_usage_pct = excluded.disk_usage_pct,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(worker_id)
    .bind(&now)
    .bind(status.as_str())
    .bind(current_job_id)
    .bind(memory_usage_mb)
    .bind(disk_usage_pct)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(())
}
