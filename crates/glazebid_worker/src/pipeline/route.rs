//! ROUTING stage: decide which pages matter and warm the thumbnail
//! cache for them.

use serde_json::json;
use tracing::{info, warn};

use glazebid_db::jobs::{self, StatusUpdate};
use glazebid_db::renders;
use glazebid_protocol::{JobStatus, PageClass, PageEntry, RenderKind, Routing};

use crate::context::WorkerContext;

use super::{JobState, StageError};

/// Classifications that are relevant regardless of keyword hits.
pub const RELEVANT_CLASSIFICATIONS: &[PageClass] = &[
    PageClass::Schedule,
    PageClass::Detail,
    PageClass::Notes,
    PageClass::Elevation,
];

/// A page is relevant when its classification says so, or when keyword
/// relevance pulled it in (which is how floor plans qualify).
pub fn compute_relevant_pages(page_index: &[PageEntry]) -> Vec<u32> {
    page_index
        .iter()
        .filter(|page| {
            RELEVANT_CLASSIFICATIONS.contains(&page.classification)
                || !page.relevant_to.is_empty()
        })
        .map(|page| page.page_num)
        .collect()
}

pub async fn run_routing(ctx: &WorkerContext, job: &mut JobState) -> Result<(), StageError> {
    info!("Starting ROUTING stage for job {}", job.id);
    jobs::update_job_status(
        &ctx.pool,
        &job.id,
        JobStatus::Routing,
        StatusUpdate::keeping_lock(),
    )
    .await?;

    if !job.ssot.routing.is_empty() {
        info!("ROUTING: routing already exists, skipping job {}", job.id);
        let progress = json!({"stage": "routing", "status": "complete_skipped"});
        jobs::update_job_status(
            &ctx.pool,
            &job.id,
            JobStatus::Routed,
            StatusUpdate {
                stage_progress: Some(&progress),
                keep_lock: true,
                ..Default::default()
            },
        )
        .await?;
        job.status = JobStatus::Routed;
        return Ok(());
    }

    let relevant_pages = compute_relevant_pages(&job.ssot.page_index);
    info!(
        "Routing job {}: {} of {} pages relevant",
        job.id,
        relevant_pages.len(),
        job.ssot.page_index.len()
    );

    // Eager thumbnails for the pages a reviewer will want to see.
    for page_num in &relevant_pages {
        if let Err(e) = renders::enqueue_render_request(
            &ctx.pool,
            &job.id,
            *page_num,
            RenderKind::Thumb,
            ctx.config.thumb_dpi,
        )
        .await
        {
            warn!("Could not create THUMB request for page {}: {}", page_num, e);
        }
    }

    job.ssot.routing = Routing {
        relevant_pages,
        total_pages: job.ssot.page_index.len() as u32,
    };

    let progress = json!({
        "stage": "routing",
        "status": "complete",
        "relevant_pages": job.ssot.routing.relevant_pages.len(),
    });
    jobs::update_job_status(
        &ctx.pool,
        &job.id,
        JobStatus::Routed,
        StatusUpdate {
            ssot: Some(&job.ssot),
            stage_progress: Some(&progress),
            keep_lock: true,
            ..Default::default()
        },
    )
    .await?;
    job.status = JobStatus::Routed;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{insert_job, job_row, test_context};
    use glazebid_protocol::Ssot;

    fn entry(page_num: u32, classification: PageClass, relevant_to: &[&str]) -> PageEntry {
        PageEntry {
            page_num,
            classification,
            confidence: 0.8,
            relevant_to: relevant_to.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn classification_relevance() {
        let pages = vec![
            entry(0, PageClass::Title, &[]),
            entry(1, PageClass::Schedule, &[]),
            entry(2, PageClass::Notes, &[]),
            entry(3, PageClass::Irrelevant, &[]),
            entry(4, PageClass::Detail, &[]),
            entry(5, PageClass::Elevation, &[]),
        ];
        assert_eq!(compute_relevant_pages(&pages), vec![1, 2, 4, 5]);
    }

    #[test]
    fn floor_plan_needs_keywords() {
        let pages = vec![
            entry(0, PageClass::FloorPlan, &[]),
            entry(1, PageClass::FloorPlan, &["showers"]),
        ];
        assert_eq!(compute_relevant_pages(&pages), vec![1]);
    }

    async fn routed_job(ssot_json: &str) -> (String, Ssot, Vec<(String, i64)>) {
        let (ctx, _store, _tmp) = test_context(vec![]).await;
        insert_job(&ctx.pool, "j1", "INDEXED", ssot_json).await;

        let mut job = JobState {
            id: "j1".into(),
            project_id: "p1".into(),
            status: JobStatus::Indexed,
            ssot: serde_json::from_str(ssot_json).unwrap(),
            retry_count: 0,
            max_retries: 3,
        };
        run_routing(&ctx, &mut job).await.unwrap();

        let (status, raw) = job_row(&ctx.pool, "j1").await;
        let requests: Vec<(String, i64)> =
            sqlx::query_as("SELECT kind, page_num FROM render_requests ORDER BY page_num")
                .fetch_all(&ctx.pool)
                .await
                .unwrap();
        (status, serde_json::from_str(&raw).unwrap(), requests)
    }

    #[tokio::test]
    async fn empty_page_index_routes_to_zero_pages() {
        let (status, ssot, requests) = routed_job("{}").await;
        assert_eq!(status, "ROUTED");
        assert!(ssot.routing.relevant_pages.is_empty());
        assert_eq!(ssot.routing.total_pages, 0);
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn relevant_pages_get_thumb_requests() {
        let ssot_json = r#"{"pageIndex":[
            {"pageNum":0,"classification":"TITLE","confidence":0.85,"relevantTo":[]},
            {"pageNum":1,"classification":"SCHEDULE","confidence":0.8,"relevantTo":[]},
            {"pageNum":2,"classification":"FLOOR_PLAN","confidence":0.7,"relevantTo":["showers"]}
        ]}"#;
        let (status, ssot, requests) = routed_job(ssot_json).await;
        assert_eq!(status, "ROUTED");
        assert_eq!(ssot.routing.relevant_pages, vec![1, 2]);
        assert_eq!(ssot.routing.total_pages, 3);
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|(kind, _)| kind == "THUMB"));
    }

    #[tokio::test]
    async fn rerouting_is_a_skip() {
        let ssot_json = r#"{
            "pageIndex":[{"pageNum":0,"classification":"SCHEDULE","confidence":0.8,"relevantTo":[]}],
            "routing":{"relevantPages":[0],"totalPages":1}
        }"#;
        let (status, ssot, requests) = routed_job(ssot_json).await;
        assert_eq!(status, "ROUTED");
        assert_eq!(ssot.routing.relevant_pages, vec![0]);
        // Skip path re-emits nothing.
        assert!(requests.is_empty());
    }
}
