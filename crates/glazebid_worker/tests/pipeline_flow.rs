//! End-to-end pipeline flow over the fake PDF engine and the in-memory
//! object store: UPLOADED through DONE, with the render queue serviced
//! along the way.

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;

use glazebid_db::{jobs, renders};
use glazebid_protocol::{OutputType, Ssot};
use glazebid_worker::pdf::{FakePage, FakePdfEngine};
use glazebid_worker::renderer;
use glazebid_worker::scheduler::Scheduler;
use glazebid_worker::storage::{MemoryStore, BUCKET_OUTPUTS, BUCKET_PAGE_CACHE, BUCKET_RAW_UPLOADS};
use glazebid_worker::{Config, WorkerContext};

async fn create_schema(pool: &sqlx::SqlitePool) {
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
            created_at TEXT NOT NULL DEFAULT '2024-01-01T00:00:00+00:00',
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

async fn worker_context(
    pages: Vec<FakePage>,
) -> (WorkerContext, Arc<MemoryStore>, tempfile::TempDir) {
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
    let ctx = WorkerContext::new(config, pool, store.clone(), Arc::new(FakePdfEngine::new(pages)));
    (ctx, store, tmp)
}

async fn job_state(pool: &sqlx::SqlitePool) -> (String, Ssot) {
    let (status, raw): (String, String) =
        sqlx::query_as("SELECT status, ssot FROM jobs WHERE id = 'j1'")
            .fetch_one(pool)
            .await
            .unwrap();
    (status, serde_json::from_str(&raw).unwrap())
}

#[tokio::test]
async fn uploaded_job_runs_to_done_through_review_cycle() {
    let (ctx, store, _tmp) = worker_context(vec![
        FakePage::letter("Cover Sheet - Tower A"),
        FakePage::letter("DOOR SCHEDULE\n\nInline panel shower enclosure 36\" x 72\""),
        FakePage::letter(
            "GENERAL NOTES\nASSUMPTIONS:\n- Tempered glass throughout\nEXCLUSIONS:\n- Demolition",
        ),
    ])
    .await;
    let scheduler = Scheduler::new(ctx.clone());

    store.insert(BUCKET_RAW_UPLOADS, "p1/j1/source.pdf", b"%PDF-fake".to_vec());
    sqlx::query("INSERT INTO jobs (id, status) VALUES ('j1', 'UPLOADED')")
        .execute(&ctx.pool)
        .await
        .unwrap();

    // First claim: UPLOADED -> index, route, extract.
    let job = jobs::claim_main_job(&ctx.pool, "w1").await.unwrap().unwrap();
    scheduler.process_main_job(job).await;

    let (status, ssot) = job_state(&ctx.pool).await;
    assert_eq!(status, "EXTRACTED");
    assert_eq!(ssot.metadata.page_count, 3);
    assert_eq!(ssot.page_index.len(), 3);
    assert!(!ssot.routing.relevant_pages.is_empty());
    assert_eq!(ssot.items.len(), 1);
    assert_eq!(ssot.items[0].configuration, "inline-panel");
    assert_eq!(ssot.items[0].dimensions.width.value, Some(36.0));
    assert_eq!(ssot.assumptions, vec!["Tempered glass throughout"]);
    assert_eq!(ssot.exclusions, vec!["Demolition"]);
    assert!(ssot.measurement_tasks.is_empty());

    // The lock is released at the end of the chain.
    let locked_by: Option<String> = sqlx::query_scalar("SELECT locked_by FROM jobs WHERE id = 'j1'")
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert!(locked_by.is_none());

    // Routing warmed the thumbnail queue; service one request.
    let request = renders::claim_render_request(&ctx.pool, "w1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.kind, "THUMB");
    renderer::process_render_request(&ctx, &request).await;

    let (req_status, output_key): (String, Option<String>) =
        sqlx::query_as("SELECT status, output_key FROM render_requests WHERE id = ?")
            .bind(&request.id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(req_status, "DONE");
    let output_key = output_key.unwrap();
    assert!(output_key.ends_with(".png"));
    assert!(store.get(BUCKET_PAGE_CACHE, &output_key).is_some());

    // Review happens outside the worker.
    sqlx::query("UPDATE jobs SET status = 'REVIEWED' WHERE id = 'j1'")
        .execute(&ctx.pool)
        .await
        .unwrap();

    // Second claim: REVIEWED -> price.
    let job = jobs::claim_main_job(&ctx.pool, "w1").await.unwrap().unwrap();
    scheduler.process_main_job(job).await;
    let (status, ssot) = job_state(&ctx.pool).await;
    assert_eq!(status, "PRICED");
    let pricing = ssot.pricing.as_ref().unwrap();
    assert_eq!(pricing.line_items.len(), 1);
    // Fallback rate: 36*72/144 = 18 sqft at $45.
    assert_eq!(pricing.subtotal, 810.0);

    // Third claim: PRICED -> generate.
    let job = jobs::claim_main_job(&ctx.pool, "w1").await.unwrap().unwrap();
    scheduler.process_main_job(job).await;
    let (status, ssot) = job_state(&ctx.pool).await;
    assert_eq!(status, "DONE");
    assert_eq!(ssot.outputs.len(), 2);
    assert!(ssot
        .outputs
        .iter()
        .any(|o| o.output_type == OutputType::BidPdf && o.version == 1));
    assert!(store.get(BUCKET_OUTPUTS, "p1/j1/bid-v1.pdf").is_some());

    // Terminal: nothing left to claim.
    assert!(jobs::claim_main_job(&ctx.pool, "w1").await.unwrap().is_none());
}

#[tokio::test]
async fn job_with_missing_dimensions_pauses_for_review() {
    let (ctx, store, _tmp) = worker_context(vec![FakePage::letter(
        "Frameless shower enclosure, inline panel, field verify",
    )])
    .await;
    let scheduler = Scheduler::new(ctx.clone());

    store.insert(BUCKET_RAW_UPLOADS, "p1/j1/source.pdf", b"%PDF-fake".to_vec());
    sqlx::query("INSERT INTO jobs (id, status) VALUES ('j1', 'UPLOADED')")
        .execute(&ctx.pool)
        .await
        .unwrap();

    let job = jobs::claim_main_job(&ctx.pool, "w1").await.unwrap().unwrap();
    scheduler.process_main_job(job).await;

    let (status, ssot) = job_state(&ctx.pool).await;
    assert_eq!(status, "NEEDS_REVIEW");
    assert_eq!(ssot.items.len(), 1);
    assert_eq!(ssot.measurement_tasks.len(), 2);
    assert!(ssot.needs_review());

    // The MEASURE request outranks any pending THUMB.
    let request = renders::claim_render_request(&ctx.pool, "w1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.kind, "MEASURE");
    assert_eq!(request.dpi, 200);

    // A NEEDS_REVIEW job is not claimable.
    assert!(jobs::claim_main_job(&ctx.pool, "w1").await.unwrap().is_none());
}

#[tokio::test]
async fn failing_job_backs_off_then_fails_permanently() {
    // No source.pdf in the store: indexing fails on download.
    let (ctx, _store, _tmp) = worker_context(vec![]).await;
    let scheduler = Scheduler::new(ctx.clone());

    sqlx::query("INSERT INTO jobs (id, status, max_retries) VALUES ('j1', 'UPLOADED', 1)")
        .execute(&ctx.pool)
        .await
        .unwrap();

    let job = jobs::claim_main_job(&ctx.pool, "w1").await.unwrap().unwrap();
    scheduler.process_main_job(job).await;

    let (retry_count, next_run_at, status): (i64, Option<String>, String) =
        sqlx::query_as("SELECT retry_count, next_run_at, status FROM jobs WHERE id = 'j1'")
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(retry_count, 1);
    assert!(next_run_at.is_some());
    // Rewound to the claimed status so the retry can be claimed.
    assert_eq!(status, "UPLOADED");

    // Backoff makes it ineligible right now.
    assert!(jobs::claim_main_job(&ctx.pool, "w1").await.unwrap().is_none());

    // Let the backoff elapse and fail again: retries exhausted.
    sqlx::query("UPDATE jobs SET next_run_at = '2024-01-01T00:00:00+00:00' WHERE id = 'j1'")
        .execute(&ctx.pool)
        .await
        .unwrap();
    let job = jobs::claim_main_job(&ctx.pool, "w1").await.unwrap().unwrap();
    scheduler.process_main_job(job).await;

    let (status, error_code): (String, Option<String>) =
        sqlx::query_as("SELECT status, error_code FROM jobs WHERE id = 'j1'")
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(status, "FAILED");
    assert_eq!(error_code.as_deref(), Some("STORAGE_ERROR"));
}
