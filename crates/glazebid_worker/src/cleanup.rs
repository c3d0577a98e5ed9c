//! Daily retention sweep.
//!
//! Every sub-step is independent: a failure is logged and the sweep
//! carries on. Blob deletion happens before row deletion, and the row
//! goes away even when the blob removal failed.

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use glazebid_db::{renders, retention, storage_objects};
use glazebid_protocol::JobStatus;

use glazebid_db::jobs::{self, StatusUpdate};

use crate::context::WorkerContext;
use crate::disk;

/// Expired-object batch size per sweep.
const EXPIRED_BATCH: i64 = 500;

/// Uploads with no progress for this long are abandoned.
const STALE_UPLOAD_HOURS: i64 = 24;
const STALE_UPLOAD_BATCH: i64 = 100;

/// SSOT bodies and audit rows are kept this long.
const RETENTION_DAYS: i64 = 180;

/// Above this disk usage the sweep also evicts page-cache objects.
const EMERGENCY_DISK_PCT: f64 = 90.0;
const EMERGENCY_EVICT_COUNT: i64 = 200;

/// Render-queue hygiene.
const THUMB_MAX_AGE_MINUTES: i64 = 60;
const THUMB_CAP_PER_JOB: i64 = 50;

#[derive(Debug, Default, Serialize)]
pub struct CleanupSummary {
    pub expired_objects: u64,
    pub stale_uploads: u64,
    pub old_ssot_audit: u64,
    pub emergency_evicted: u64,
    pub thumbs_expired: u64,
    pub thumbs_capped: u64,
    pub disk_usage_pct: f64,
}

async fn remove_blob_then_row(ctx: &WorkerContext, id: &str, bucket: &str, key: &str) -> bool {
    if let Err(e) = ctx.store.remove(bucket, key).await {
        warn!("Failed to delete blob {}/{}: {}", bucket, key, e);
    }
    match storage_objects::delete_object_row(&ctx.pool, id).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to delete storage object row {}: {}", id, e);
            false
        }
    }
}

async fn cleanup_expired_objects(ctx: &WorkerContext) -> u64 {
    let mut count = 0;
    match storage_objects::expired_batch(&ctx.pool, Utc::now(), EXPIRED_BATCH).await {
        Ok(expired) => {
            for object in expired {
                if remove_blob_then_row(ctx, &object.id, &object.bucket, &object.key).await {
                    count += 1;
                }
            }
        }
        Err(e) => error!("Expired object cleanup failed: {}", e),
    }
    info!("Expired storage cleanup complete, deleted {}", count);
    count
}

async fn cleanup_stale_uploads(ctx: &WorkerContext) -> u64 {
    let cutoff = Utc::now() - Duration::hours(STALE_UPLOAD_HOURS);
    let mut count = 0;

    match retention::stale_uploads(&ctx.pool, cutoff, STALE_UPLOAD_BATCH).await {
        Ok(stale) => {
            for row in stale {
                if let (Some(object_id), Some(bucket), Some(key)) =
                    (&row.object_id, &row.bucket, &row.key)
                {
                    remove_blob_then_row(ctx, object_id, bucket, key).await;
                }
                let result = jobs::update_job_status(
                    &ctx.pool,
                    &row.job_id,
                    JobStatus::Failed,
                    StatusUpdate {
                        error_code: Some("UPLOAD_ABANDONED"),
                        error_message: Some("Upload abandoned after 24h of inactivity"),
                        ..Default::default()
                    },
                )
                .await;
                match result {
                    Ok(()) => count += 1,
                    Err(e) => warn!("Could not fail stale upload {}: {}", row.job_id, e),
                }
            }
        }
        Err(e) => error!("Stale upload cleanup failed: {}", e),
    }
    info!("Stale upload cleanup complete, cleaned {}", count);
    count
}

async fn cleanup_old_ssot_and_audit(ctx: &WorkerContext) -> u64 {
    let cutoff = Utc::now() - Duration::days(RETENTION_DAYS);
    let mut count = 0;

    match retention::clear_old_ssot(&ctx.pool, cutoff).await {
        Ok(n) => count += n,
        Err(e) => error!("SSOT retention failed: {}", e),
    }
    match retention::delete_old_audit(&ctx.pool, cutoff).await {
        Ok(n) => count += n,
        Err(e) => error!("Audit retention failed: {}", e),
    }
    info!("SSOT/audit cleanup complete, affected {}", count);
    count
}

async fn emergency_page_cache_eviction(ctx: &WorkerContext) -> u64 {
    let mut count = 0;
    match storage_objects::oldest_page_cache(&ctx.pool, EMERGENCY_EVICT_COUNT).await {
        Ok(objects) => {
            for object in objects {
                if remove_blob_then_row(ctx, &object.id, &object.bucket, &object.key).await {
                    count += 1;
                }
            }
        }
        Err(e) => error!("Emergency eviction failed: {}", e),
    }
    info!("Emergency page-cache eviction complete, deleted {}", count);
    count
}

/// Run the full sweep. Never fails; everything is logged.
pub async fn run_daily_cleanup(ctx: &WorkerContext) -> CleanupSummary {
    info!("Starting daily cleanup run");
    let mut summary = CleanupSummary {
        expired_objects: cleanup_expired_objects(ctx).await,
        stale_uploads: cleanup_stale_uploads(ctx).await,
        old_ssot_audit: cleanup_old_ssot_and_audit(ctx).await,
        ..Default::default()
    };

    match renders::expire_stale_thumb_requests(&ctx.pool, THUMB_MAX_AGE_MINUTES).await {
        Ok(n) => summary.thumbs_expired = n,
        Err(e) => error!("THUMB expiry failed: {}", e),
    }
    match renders::cap_pending_thumbs_per_job(&ctx.pool, THUMB_CAP_PER_JOB).await {
        Ok(n) => summary.thumbs_capped = n,
        Err(e) => error!("THUMB cap failed: {}", e),
    }

    summary.disk_usage_pct = disk::usage_pct(&ctx.config.temp_dir);
    if summary.disk_usage_pct >= EMERGENCY_DISK_PCT {
        summary.emergency_evicted = emergency_page_cache_eviction(ctx).await;
    }

    info!(
        "Daily cleanup complete: {}",
        serde_json::to_string(&summary).unwrap_or_default()
    );
    summary
}
