//! INDEXING stage: classify every page of the source PDF.
//!
//! Classification is keyword scoring over the extracted page text; the
//! score for a class is the fraction of its keyword list present on the
//! page. Pages that match nothing convincingly are IRRELEVANT.

use serde_json::json;
use tracing::info;

use glazebid_db::jobs::{self, StatusUpdate};
use glazebid_protocol::{JobStatus, PageClass, PageEntry};

use crate::context::WorkerContext;
use crate::renderer::ensure_source_pdf;

use super::{JobState, StageError};

/// Progress row every this many pages.
const PROGRESS_EVERY: u32 = 50;

const TITLE_CONFIDENCE: f64 = 0.85;
const IRRELEVANT_CONFIDENCE: f64 = 0.3;
const MIN_CLASS_SCORE: f64 = 0.1;

pub const CLASSIFICATION_KEYWORDS: &[(PageClass, &[&str])] = &[
    (
        PageClass::FloorPlan,
        &[
            "floor plan",
            "plan view",
            "layout",
            "unit plan",
            "reflected ceiling",
            "furniture plan",
        ],
    ),
    (
        PageClass::Elevation,
        &[
            "elevation",
            "interior elevation",
            "wall elevation",
            "section",
            "detail elevation",
        ],
    ),
    (
        PageClass::Schedule,
        &[
            "schedule",
            "door schedule",
            "window schedule",
            "finish schedule",
            "hardware schedule",
            "fixture schedule",
        ],
    ),
    (
        PageClass::Detail,
        &[
            "detail",
            "enlarged",
            "section detail",
            "typical detail",
            "shower detail",
            "glass detail",
            "mirror detail",
        ],
    ),
    (
        PageClass::Notes,
        &[
            "general notes",
            "specifications",
            "notes",
            "abbreviations",
            "symbols",
            "legend",
            "assumptions",
            "exclusions",
        ],
    ),
    (
        PageClass::Title,
        &[
            "title sheet",
            "cover sheet",
            "cover page",
            "index",
            "sheet index",
            "drawing index",
        ],
    ),
];

pub const RELEVANCE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "showers",
        &[
            "shower",
            "enclosure",
            "frameless",
            "glass panel",
            "shower door",
            "shower screen",
            "steam shower",
        ],
    ),
    (
        "mirrors",
        &["mirror", "vanity mirror", "bathroom mirror"],
    ),
    (
        "assumptions",
        &[
            "assumption",
            "exclusion",
            "general note",
            "note",
            "specification",
            "scope",
        ],
    ),
];

/// Classify one page from its text. `page_num` is zero-based.
pub fn classify_page(text: &str, page_num: u32) -> (PageClass, f64) {
    let text = text.to_lowercase();

    // Title sheets live at the front of the set.
    if page_num <= 1 {
        let title_keywords = CLASSIFICATION_KEYWORDS
            .iter()
            .find(|(class, _)| *class == PageClass::Title)
            .map(|(_, kws)| *kws)
            .unwrap_or(&[]);
        if title_keywords.iter().any(|kw| text.contains(kw)) {
            return (PageClass::Title, TITLE_CONFIDENCE);
        }
    }

    let mut best_class = PageClass::Irrelevant;
    let mut best_score = 0.0_f64;
    for (class, keywords) in CLASSIFICATION_KEYWORDS {
        let matched = keywords.iter().filter(|kw| text.contains(*kw)).count();
        let score = matched as f64 / keywords.len() as f64;
        if score > best_score {
            best_score = score;
            best_class = *class;
        }
    }

    if best_score < MIN_CLASS_SCORE {
        return (PageClass::Irrelevant, IRRELEVANT_CONFIDENCE);
    }

    let confidence = (0.95_f64).min(0.4 + best_score * 0.6);
    (best_class, (confidence * 100.0).round() / 100.0)
}

/// Which interest areas the page text touches.
pub fn detect_relevance(text: &str) -> Vec<String> {
    let text = text.to_lowercase();
    RELEVANCE_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| text.contains(*kw)))
        .map(|(area, _)| area.to_string())
        .collect()
}

pub async fn run_indexing(ctx: &WorkerContext, job: &mut JobState) -> Result<(), StageError> {
    info!("Starting INDEXING stage for job {}", job.id);
    jobs::update_job_status(
        &ctx.pool,
        &job.id,
        JobStatus::Indexing,
        StatusUpdate::keeping_lock(),
    )
    .await?;

    if !job.ssot.page_index.is_empty() {
        info!("INDEXING: pageIndex already exists, skipping job {}", job.id);
        let progress = json!({"stage": "indexing", "status": "complete_skipped"});
        jobs::update_job_status(
            &ctx.pool,
            &job.id,
            JobStatus::Indexed,
            StatusUpdate {
                stage_progress: Some(&progress),
                keep_lock: true,
                ..Default::default()
            },
        )
        .await?;
        return Ok(());
    }

    let local_pdf = ensure_source_pdf(ctx, &job.id, Some(&job.project_id)).await?;
    let doc = ctx.pdf.open(&local_pdf)?;
    let total_pages = doc.page_count();
    info!("PDF opened for job {}: {} pages", job.id, total_pages);

    job.ssot.metadata.page_count = total_pages;

    let mut page_index = Vec::with_capacity(total_pages as usize);
    for page_num in 0..total_pages {
        let text = doc.page_text(page_num)?;
        let (classification, confidence) = classify_page(&text, page_num);
        let relevant_to = detect_relevance(&text);
        page_index.push(PageEntry {
            page_num,
            classification,
            confidence,
            relevant_to,
        });

        if (page_num + 1) % PROGRESS_EVERY == 0 {
            let progress = json!({
                "stage": "indexing",
                "current_page": page_num + 1,
                "total_pages": total_pages,
            });
            jobs::update_job_status(
                &ctx.pool,
                &job.id,
                JobStatus::Indexing,
                StatusUpdate {
                    stage_progress: Some(&progress),
                    keep_lock: true,
                    ..Default::default()
                },
            )
            .await?;
        }
    }
    drop(doc);

    job.ssot.page_index = page_index;

    let progress = json!({
        "stage": "indexing",
        "status": "complete",
        "total_pages": job.ssot.page_index.len(),
    });
    jobs::update_job_status(
        &ctx.pool,
        &job.id,
        JobStatus::Indexed,
        StatusUpdate {
            ssot: Some(&job.ssot),
            stage_progress: Some(&progress),
            keep_lock: true,
            ..Default::default()
        },
    )
    .await?;
    job.status = JobStatus::Indexed;

    info!(
        "INDEXING complete for job {}: {} pages indexed",
        job.id,
        job.ssot.page_index.len()
    );
    Ok(())
}
