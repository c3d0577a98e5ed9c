//! Render request queue.
//!
//! Requests carry no lock columns: the claim returns the oldest PENDING
//! row and completion is an idempotent UPDATE keyed by id. A request that
//! two workers race on is rendered twice into the same key, which is
//! harmless. MEASURE requests gate extraction review, so they are claimed
//! ahead of THUMB regardless of age.

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use glazebid_protocol::RenderKind;

use crate::error::DbError;
use crate::models::RenderRequest;
use crate::pool::DbPool;

/// Claim the next pending render request for this worker.
pub async fn claim_render_request(
    pool: &DbPool,
    worker_id: &str,
) -> Result<Option<RenderRequest>, DbError> {
    let request: Option<RenderRequest> = sqlx::query_as(
        r#"
        SELECT id, job_id, page_num, kind, dpi
        FROM render_requests
        WHERE status = 'PENDING'
        ORDER BY CASE WHEN kind = 'MEASURE' THEN 0 ELSE 1 END, created_at ASC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    if let Some(req) = &request {
        info!(
            "Claimed render request {} ({} page {}) as {}",
            req.id, req.kind, req.page_num, worker_id
        );
    }
    Ok(request)
}

/// Enqueue a request; a PENDING duplicate for the same (job, page, kind)
/// is dropped by the unique constraint.
pub async fn enqueue_render_request(
    pool: &DbPool,
    job_id: &str,
    page_num: u32,
    kind: RenderKind,
    dpi: u32,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO render_requests (id, job_id, page_num, kind, dpi, status, created_at)
        VALUES (?, ?, ?, ?, ?, 'PENDING', ?)
        ON CONFLICT (job_id, page_num, kind) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(job_id)
    .bind(page_num as i64)
    .bind(kind.as_str())
    .bind(dpi as i64)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a request DONE with the page-cache key it produced.
pub async fn complete_render_request(
    pool: &DbPool,
    request_id: &str,
    output_key: &str,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE render_requests
        SET status = 'DONE', output_key = ?, completed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(output_key)
    .bind(Utc::now().to_rfc3339())
    .bind(request_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a request FAILED. The main loop may enqueue a fresh one later.
pub async fn fail_render_request(pool: &DbPool, request_id: &str) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE render_requests
        SET status = 'FAILED', completed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(request_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Drop PENDING THUMB requests nobody has picked up within the age limit.
/// MEASURE and completed rows are untouched.
pub async fn expire_stale_thumb_requests(
    pool: &DbPool,
    max_age_minutes: i64,
) -> Result<u64, DbError> {
    let cutoff = (Utc::now() - Duration::minutes(max_age_minutes)).to_rfc3339();
    let deleted = sqlx::query(
        r#"
        DELETE FROM render_requests
        WHERE status = 'PENDING' AND kind = 'THUMB' AND created_at < ?
        "#,
    )
    .bind(&cutoff)
    .execute(pool)
    .await?
    .rows_affected();

    if deleted > 0 {
        info!("Expired {} stale THUMB render requests", deleted);
    }
    Ok(deleted)
}

/// Bound the PENDING THUMB backlog per job: keep the newest
/// `max_pending`, delete the oldest excess.
pub async fn cap_pending_thumbs_per_job(pool: &DbPool, max_pending: i64) -> Result<u64, DbError> {
    let deleted = sqlx::query(
        r#"
        DELETE FROM render_requests
        WHERE id IN (
            SELECT id FROM (
                SELECT id,
                       ROW_NUMBER() OVER (
                           PARTITION BY job_id ORDER BY created_at DESC
                       ) AS newest_rank
                FROM render_requests
                WHERE status = 'PENDING' AND kind = 'THUMB'
            )
            WHERE newest_rank > ?
        )
        "#,
    )
    .bind(max_pending)
    .execute(pool)
    .await?
    .rows_affected();

    if deleted > 0 {
        info!("Capped THUMB backlog, dropped {} requests", deleted);
    }
    Ok(deleted)
}
