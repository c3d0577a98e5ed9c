//! GENERATING stage: validation gate, then bid and shop-drawing PDFs.
//!
//! A blocking validation issue reverts the job to PRICED with the issue
//! list in `stage_progress` so an operator can fix the SSOT and
//! resubmit. The bid PDF is mandatory; shop drawings are best-effort.

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use glazebid_db::jobs::{self, StatusUpdate};
use glazebid_db::storage_objects;
use glazebid_protocol::{
    validate_for_generation, JobStatus, OutputRecord, OutputType, Ssot,
};

use crate::context::WorkerContext;
use crate::generators::{bid_pdf, shop_drawings};
use crate::storage::{self, BUCKET_OUTPUTS};

use super::{JobState, StageError};

/// Generated artifacts are retained for 30 days.
const OUTPUT_TTL_DAYS: i64 = 30;

fn next_version(ssot: &Ssot, output_type: OutputType) -> u32 {
    ssot.outputs
        .iter()
        .filter(|o| o.output_type == output_type)
        .map(|o| o.version)
        .max()
        .unwrap_or(0)
        + 1
}

async fn sha256_file(path: &std::path::Path) -> Result<(String, u64), StageError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StageError::Generator(format!("cannot read artifact: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok((hex::encode(hasher.finalize()), bytes.len() as u64))
}

/// Build, write, upload and record one artifact. Returns `None` when the
/// generator produced no pages (a shop-drawing set with no items).
async fn generate_artifact(
    ctx: &WorkerContext,
    job: &JobState,
    output_type: OutputType,
    version: u32,
    date: &str,
) -> Result<Option<OutputRecord>, StageError> {
    let document = match output_type {
        OutputType::BidPdf => bid_pdf::build_bid_document(&job.ssot, version, date),
        OutputType::ShopDrawingsPdf => shop_drawings::build_shop_drawings(&job.ssot, date),
    };
    if document.is_empty() {
        return Ok(None);
    }

    let filename = format!("{}-v{}.pdf", output_type.file_stem(), version);
    let temp_dir = ctx.config.job_temp_dir(&job.id);
    tokio::fs::create_dir_all(&temp_dir)
        .await
        .map_err(|e| StageError::Generator(format!("cannot create temp dir: {e}")))?;
    let local_path = temp_dir.join(&filename);

    ctx.pdf.write_document(&document, &local_path)?;
    let (sha256, size_bytes) = sha256_file(&local_path).await?;
    if size_bytes == 0 {
        return Err(StageError::Generator(format!(
            "generated artifact {} is empty",
            filename
        )));
    }

    let key = storage::artifact_key(&job.project_id, &job.id, &filename);
    ctx.store
        .upload(BUCKET_OUTPUTS, &key, &local_path, "application/pdf")
        .await?;

    if let Err(e) = storage_objects::insert_object(
        &ctx.pool,
        &job.id,
        BUCKET_OUTPUTS,
        &key,
        size_bytes,
        &sha256,
        "application/pdf",
        OUTPUT_TTL_DAYS,
    )
    .await
    {
        warn!("Could not register storage object {}: {}", key, e);
    }

    info!("{} generated for job {}: {}", output_type, job.id, key);
    Ok(Some(OutputRecord {
        output_id: Uuid::new_v4().to_string(),
        output_type,
        version,
        bucket: BUCKET_OUTPUTS.to_string(),
        key,
        generated_at: Utc::now(),
        sha256,
    }))
}

pub async fn run_generation(ctx: &WorkerContext, job: &mut JobState) -> Result<(), StageError> {
    info!("Starting GENERATING stage for job {}", job.id);
    jobs::update_job_status(
        &ctx.pool,
        &job.id,
        JobStatus::Generating,
        StatusUpdate::keeping_lock(),
    )
    .await?;

    // Validation gate.
    let issues = validate_for_generation(&job.ssot);
    let blocking: Vec<_> = issues.iter().filter(|i| i.is_blocking()).collect();
    if !blocking.is_empty() {
        warn!(
            "Generation blocked for job {}: {} validation error(s)",
            job.id,
            blocking.len()
        );
        let progress = json!({
            "stage": "generating",
            "status": "validation_failed",
            "errors": blocking,
        });
        let message = format!("Validation failed: {} error(s)", blocking.len());
        jobs::update_job_status(
            &ctx.pool,
            &job.id,
            JobStatus::Priced,
            StatusUpdate {
                ssot: Some(&job.ssot),
                stage_progress: Some(&progress),
                error_code: Some("VALIDATION_ERROR"),
                error_message: Some(&message),
                ..Default::default()
            },
        )
        .await?;
        job.status = JobStatus::Priced;
        return Ok(());
    }

    let date = Utc::now().format("%Y-%m-%d").to_string();

    // Bid PDF is the point of the pipeline; failure here is a stage
    // failure.
    let bid_version = next_version(&job.ssot, OutputType::BidPdf);
    let bid = generate_artifact(ctx, job, OutputType::BidPdf, bid_version, &date)
        .await?
        .ok_or_else(|| StageError::Generator("bid document had no pages".to_string()))?;
    job.ssot.outputs.push(bid);

    // Shop drawings are secondary; log and continue on failure.
    let shop_version = next_version(&job.ssot, OutputType::ShopDrawingsPdf);
    match generate_artifact(ctx, job, OutputType::ShopDrawingsPdf, shop_version, &date).await {
        Ok(Some(record)) => job.ssot.outputs.push(record),
        Ok(None) => info!("No shop drawings to generate for job {}", job.id),
        Err(e) => warn!("Shop drawings generation failed for job {}: {}", job.id, e),
    }

    let keys: Vec<&str> = job.ssot.outputs.iter().map(|o| o.key.as_str()).collect();
    let progress = json!({
        "stage": "generating",
        "status": "complete",
        "outputs": keys,
    });
    jobs::update_job_status(
        &ctx.pool,
        &job.id,
        JobStatus::Done,
        StatusUpdate {
            ssot: Some(&job.ssot),
            stage_progress: Some(&progress),
            ..Default::default()
        },
    )
    .await?;
    job.status = JobStatus::Done;
    info!("GENERATING complete, job {} DONE", job.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{insert_job, job_row, test_context};
    use glazebid_protocol::{Breakdown, DimValue, LineItem, Pricing, ScopeItem};

    fn priced_ssot(subtotal: f64, line_total: f64) -> Ssot {
        let mut ssot = Ssot::default();
        ssot.metadata.project_name = Some("Tower A".to_string());

        let mut item: ScopeItem = serde_json::from_str(
            r#"{"itemId":"i1","category":"SHOWER_ENCLOSURE","configuration":"inline-panel"}"#,
        )
        .unwrap();
        item.dimensions.width = DimValue::from_callout(36.0);
        item.dimensions.height = DimValue::from_callout(72.0);
        ssot.items.push(item);

        ssot.pricing = Some(Pricing {
            line_items: vec![LineItem {
                item_id: "i1".to_string(),
                description: "Shower Enclosure (Inline Panel)".to_string(),
                unit_price: line_total,
                quantity: 1,
                total_price: line_total,
                breakdown: Breakdown::default(),
                manual_override: false,
                override_reason: None,
            }],
            subtotal,
            tax: 0.0,
            total: subtotal,
            ..Default::default()
        });
        ssot
    }

    async fn run(ssot: Ssot) -> (WorkerContext, JobState, std::sync::Arc<crate::storage::MemoryStore>, tempfile::TempDir) {
        let (ctx, store, tmp) = test_context(vec![]).await;
        let raw = serde_json::to_string(&ssot).unwrap();
        insert_job(&ctx.pool, "j1", "PRICED", &raw).await;
        let mut job = JobState {
            id: "j1".into(),
            project_id: "p1".into(),
            status: JobStatus::Priced,
            ssot,
            retry_count: 0,
            max_retries: 3,
        };
        run_generation(&ctx, &mut job).await.unwrap();
        (ctx, job, store, tmp)
    }

    #[tokio::test]
    async fn valid_ssot_generates_both_artifacts() {
        let (ctx, job, store, _tmp) = run(priced_ssot(810.0, 810.0)).await;

        assert_eq!(job.status, JobStatus::Done);
        let (status, raw) = job_row(&ctx.pool, "j1").await;
        assert_eq!(status, "DONE");

        let ssot: Ssot = serde_json::from_str(&raw).unwrap();
        assert_eq!(ssot.outputs.len(), 2);
        assert_eq!(ssot.outputs[0].output_type, OutputType::BidPdf);
        assert_eq!(ssot.outputs[0].version, 1);
        assert_eq!(ssot.outputs[0].key, "p1/j1/bid-v1.pdf");
        assert!(!ssot.outputs[0].sha256.is_empty());
        assert_eq!(ssot.outputs[1].output_type, OutputType::ShopDrawingsPdf);

        assert!(store.get(BUCKET_OUTPUTS, "p1/j1/bid-v1.pdf").is_some());
        assert!(store.get(BUCKET_OUTPUTS, "p1/j1/shop-drawings-v1.pdf").is_some());

        let object_rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM storage_objects WHERE bucket = 'outputs'")
                .fetch_one(&ctx.pool)
                .await
                .unwrap();
        assert_eq!(object_rows, 2);
    }

    #[tokio::test]
    async fn math_error_reverts_to_priced_without_outputs() {
        // Declared subtotal wildly off from the line-item sum.
        let (ctx, job, store, _tmp) = run(priced_ssot(99_999.99, 104_800.0)).await;

        assert_eq!(job.status, JobStatus::Priced);
        let (status, raw) = job_row(&ctx.pool, "j1").await;
        assert_eq!(status, "PRICED");

        let ssot: Ssot = serde_json::from_str(&raw).unwrap();
        assert!(ssot.outputs.is_empty());
        assert!(store.keys(BUCKET_OUTPUTS).is_empty());

        let (progress, error_code): (Option<String>, Option<String>) =
            sqlx::query_as("SELECT stage_progress, error_code FROM jobs WHERE id = 'j1'")
                .fetch_one(&ctx.pool)
                .await
                .unwrap();
        assert_eq!(error_code.as_deref(), Some("VALIDATION_ERROR"));
        let progress: serde_json::Value = serde_json::from_str(&progress.unwrap()).unwrap();
        assert_eq!(progress["status"], "validation_failed");
        assert_eq!(progress["errors"][0]["code"], "MATH_ERROR");
    }

    #[tokio::test]
    async fn regeneration_appends_next_version() {
        let mut ssot = priced_ssot(810.0, 810.0);
        ssot.outputs.push(OutputRecord {
            output_id: "o1".to_string(),
            output_type: OutputType::BidPdf,
            version: 3,
            bucket: "outputs".to_string(),
            key: "p1/j1/bid-v3.pdf".to_string(),
            generated_at: Utc::now(),
            sha256: "aa".to_string(),
        });

        let (_ctx, job, store, _tmp) = run(ssot).await;
        let bids: Vec<u32> = job
            .ssot
            .outputs
            .iter()
            .filter(|o| o.output_type == OutputType::BidPdf)
            .map(|o| o.version)
            .collect();
        assert_eq!(bids, vec![3, 4]);
        assert!(store.get(BUCKET_OUTPUTS, "p1/j1/bid-v4.pdf").is_some());
    }
}
