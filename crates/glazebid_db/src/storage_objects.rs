//! Storage-object rows: the source of truth for every blob the worker
//! owns in the page-cache and outputs buckets, including its TTL.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::StorageObjectRef;
use crate::pool::DbPool;

/// Authoritative key of a job's source PDF, when the upload recorded one.
pub async fn source_pdf_key(pool: &DbPool, job_id: &str) -> Result<Option<String>, DbError> {
    let key: Option<String> = sqlx::query_scalar(
        r#"
        SELECT key FROM storage_objects
        WHERE job_id = ? AND bucket = 'raw-uploads'
        LIMIT 1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;
    Ok(key)
}

/// Record a blob the worker just uploaded. `ttl_days` fixes `expires_at`
/// for the retention sweep.
#[allow(clippy::too_many_arguments)]
pub async fn insert_object(
    pool: &DbPool,
    job_id: &str,
    bucket: &str,
    key: &str,
    size_bytes: u64,
    sha256: &str,
    content_type: &str,
    ttl_days: i64,
) -> Result<(), DbError> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO storage_objects
            (id, job_id, bucket, key, size_bytes, sha256, content_type,
             ttl_policy, expires_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(job_id)
    .bind(bucket)
    .bind(key)
    .bind(size_bytes as i64)
    .bind(sha256)
    .bind(content_type)
    .bind(format!("{}d", ttl_days))
    .bind((now + Duration::days(ttl_days)).to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// A batch of rows whose TTL has passed.
pub async fn expired_batch(
    pool: &DbPool,
    as_of: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<StorageObjectRef>, DbError> {
    let rows: Vec<StorageObjectRef> = sqlx::query_as(
        r#"
        SELECT id, bucket, key FROM storage_objects
        WHERE expires_at IS NOT NULL AND expires_at < ?
        LIMIT ?
        "#,
    )
    .bind(as_of.to_rfc3339())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// The oldest page-cache rows, for emergency eviction under disk
/// pressure.
pub async fn oldest_page_cache(pool: &DbPool, limit: i64) -> Result<Vec<StorageObjectRef>, DbError> {
    let rows: Vec<StorageObjectRef> = sqlx::query_as(
        r#"
        SELECT id, bucket, key FROM storage_objects
        WHERE bucket = 'page-cache'
        ORDER BY created_at ASC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Delete a row. Callers run this even when the blob removal failed.
pub async fn delete_object_row(pool: &DbPool, id: &str) -> Result<(), DbError> {
    sqlx::query("DELETE FROM storage_objects WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
