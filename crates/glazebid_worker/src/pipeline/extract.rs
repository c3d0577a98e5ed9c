//! EXTRACTING stage: pull scope items, dimensions and notes out of the
//! relevant pages.
//!
//! Items are detected per text block by keyword match; dimensions come
//! from the dimension grammar (pair form first, labeled form second).
//! Anything missing a width or height becomes a measurement task and
//! flags the job for human review.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use glazebid_db::jobs::{self, StatusUpdate};
use glazebid_db::{measurements, renders};
use glazebid_protocol::dimension::{parse_labeled, parse_pair};
use glazebid_protocol::{
    DimValue, Dimensions, ItemCategory, JobStatus, MeasurementTask, PageClass, RenderKind,
    ScopeItem, FLAG_NEEDS_REVIEW,
};

use crate::context::WorkerContext;
use crate::renderer::ensure_source_pdf;

use super::{JobState, StageError};

pub const SHOWER_KEYWORDS: &[&str] = &[
    "shower enclosure",
    "frameless shower",
    "glass enclosure",
    "shower door",
    "glass panel",
    "fixed panel",
    "inline panel",
    "neo-angle",
    "90 degree",
    "90°",
    "corner shower",
    "bypass",
    "sliding shower",
    "steam shower",
    "bathtub enclosure",
    "tub panel",
];

pub const MIRROR_KEYWORDS: &[&str] = &[
    "vanity mirror",
    "bathroom mirror",
    "mirror",
    "beveled mirror",
    "frameless mirror",
];

/// Configuration detection, tried in order; first match wins.
pub const CONFIGURATION_KEYWORDS: &[(&str, &[&str])] = &[
    ("inline-panel", &["inline panel", "fixed panel", "single panel"]),
    ("inline-panel-door", &["panel and door", "panel + door", "inline door"]),
    ("90-degree-corner", &["90 degree corner", "90° corner", "corner panel"]),
    (
        "90-degree-corner-door",
        &["90 degree corner door", "90° corner door", "corner door"],
    ),
    ("neo-angle", &["neo-angle", "neo angle", "neoangle"]),
    ("frameless-sliding", &["sliding", "bypass", "bypass shower"]),
    ("bathtub-fixed-panel", &["bathtub panel", "tub panel", "tub fixed"]),
    ("bathtub-panel-door", &["bathtub door", "tub door", "bathtub panel door"]),
    ("vanity-mirror", &["vanity mirror", "rectangular mirror"]),
    ("vanity-mirror-custom", &["custom mirror", "shaped mirror", "mirror cutout"]),
    ("steam-shower", &["steam shower", "steam enclosure"]),
    ("custom-enclosure", &["wine cellar", "custom enclosure", "custom glass"]),
];

pub fn detect_category(text: &str) -> Option<ItemCategory> {
    let text = text.to_lowercase();
    if SHOWER_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        return Some(ItemCategory::ShowerEnclosure);
    }
    if MIRROR_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        return Some(ItemCategory::VanityMirror);
    }
    None
}

pub fn detect_configuration(text: &str) -> Option<&'static str> {
    let text = text.to_lowercase();
    for (configuration, keywords) in CONFIGURATION_KEYWORDS {
        if keywords.iter().any(|kw| text.contains(kw)) {
            return Some(configuration);
        }
    }
    None
}

/// Glass spec: 3/8" clear tempered unless the block says otherwise.
pub fn detect_glass_type(text: &str) -> String {
    let text = text.to_lowercase();
    let mut glass = "3/8 clear tempered".to_string();
    if text.contains("1/2") {
        glass = "1/2 clear tempered".to_string();
    }
    if text.contains("frosted") {
        glass = glass.replace("clear", "frosted");
    }
    if text.contains("low iron") || text.contains("starphire") {
        glass = glass.replace("clear", "low iron");
    }
    glass
}

/// Extract dimensions from one text block: a `W x H` pair wins outright,
/// otherwise labeled callouts fill individual slots.
pub fn extract_block_dimensions(block: &str) -> Dimensions {
    let mut dims = Dimensions::default();

    if let Some((width, height)) = parse_pair(block) {
        dims.width = DimValue::from_callout(width);
        dims.height = DimValue::from_callout(height);
        return dims;
    }

    let labeled = parse_labeled(block);
    if let Some(w) = labeled.width {
        dims.width = DimValue::from_callout(w);
    }
    if let Some(h) = labeled.height {
        dims.height = DimValue::from_callout(h);
    }
    if let Some(d) = labeled.depth {
        dims.depth = DimValue::from_callout(d);
    }
    dims
}

/// Scope items found on one page. Blocks are paragraph-separated.
pub fn extract_items_from_page(page_num: u32, text: &str) -> Vec<ScopeItem> {
    let mut items = Vec::new();

    for block in text.split("\n\n") {
        let Some(category) = detect_category(block) else {
            continue;
        };

        let configuration = detect_configuration(block).unwrap_or("unknown");
        let dimensions = extract_block_dimensions(block);

        let mut flags = Vec::new();
        if dimensions.width.value.is_none() || dimensions.height.value.is_none() {
            flags.push(FLAG_NEEDS_REVIEW.to_string());
        }

        items.push(ScopeItem {
            item_id: Uuid::new_v4().to_string(),
            category,
            unit_id: String::new(),
            location: String::new(),
            configuration: configuration.to_string(),
            template_id: String::new(),
            dimensions,
            glass_type: detect_glass_type(block),
            hardware: Vec::new(),
            flags,
            notes: String::new(),
            source_pages: vec![page_num],
            quantity_per_unit: 1,
        });
    }

    items
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:[-•·]+|\d+[.)])\s*").unwrap())
}

/// Pull assumptions and exclusions out of a NOTES page. A header line
/// (`ASSUMPTIONS:` / `EXCLUSIONS:`, case-insensitive) opens a section
/// that runs until the next header; bullets inside are collected with
/// their markers stripped.
pub fn extract_notes(text: &str) -> (Vec<String>, Vec<String>) {
    #[derive(PartialEq)]
    enum Section {
        None,
        Assumptions,
        Exclusions,
    }

    let mut assumptions = Vec::new();
    let mut exclusions = Vec::new();
    let mut section = Section::None;

    for line in text.lines() {
        let line = line.trim();
        let lower = line.to_lowercase();

        if lower.contains("assumptions:") {
            section = Section::Assumptions;
            continue;
        }
        if lower.contains("exclusions:") {
            section = Section::Exclusions;
            continue;
        }

        if line.is_empty() || !bullet_re().is_match(line) {
            continue;
        }
        let clean = bullet_re().replace(line, "").trim().to_string();
        if clean.is_empty() {
            continue;
        }
        match section {
            Section::Assumptions => assumptions.push(clean),
            Section::Exclusions => exclusions.push(clean),
            Section::None => {}
        }
    }

    (assumptions, exclusions)
}

/// Order-preserving de-duplication.
fn dedup_preserve(values: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

pub async fn run_extraction(ctx: &WorkerContext, job: &mut JobState) -> Result<(), StageError> {
    info!("Starting EXTRACTING stage for job {}", job.id);
    jobs::update_job_status(
        &ctx.pool,
        &job.id,
        JobStatus::Extracting,
        StatusUpdate::keeping_lock(),
    )
    .await?;

    if !job.ssot.items.is_empty() {
        info!("EXTRACTING: items already exist, skipping job {}", job.id);
        let next_status = if job.ssot.needs_review() {
            JobStatus::NeedsReview
        } else {
            JobStatus::Extracted
        };
        let progress = json!({"stage": "extracting", "status": "complete_skipped"});
        jobs::update_job_status(
            &ctx.pool,
            &job.id,
            next_status,
            StatusUpdate {
                stage_progress: Some(&progress),
                ..Default::default()
            },
        )
        .await?;
        job.status = next_status;
        return Ok(());
    }

    // Fall back to every non-IRRELEVANT page when routing is empty.
    let relevant_pages: Vec<u32> = if job.ssot.routing.relevant_pages.is_empty() {
        job.ssot
            .page_index
            .iter()
            .filter(|p| p.classification != PageClass::Irrelevant)
            .map(|p| p.page_num)
            .collect()
    } else {
        job.ssot.routing.relevant_pages.clone()
    };

    let local_pdf = ensure_source_pdf(ctx, &job.id, Some(&job.project_id)).await?;

    let mut all_items = Vec::new();
    let mut all_assumptions = Vec::new();
    let mut all_exclusions = Vec::new();

    {
        let doc = ctx.pdf.open(&local_pdf)?;
        let page_count = doc.page_count();

        for (processed, page_num) in relevant_pages.iter().copied().enumerate() {
            if page_num >= page_count {
                continue;
            }
            let text = doc.page_text(page_num)?;
            all_items.extend(extract_items_from_page(page_num, &text));

            let is_notes_page = job
                .ssot
                .page_index
                .iter()
                .any(|p| p.page_num == page_num && p.classification == PageClass::Notes);
            if is_notes_page {
                let (assumptions, exclusions) = extract_notes(&text);
                all_assumptions.extend(assumptions);
                all_exclusions.extend(exclusions);
            }

            let progress = json!({
                "stage": "extracting",
                "pages_processed": processed + 1,
                "total_pages": relevant_pages.len(),
                "items_found": all_items.len(),
            });
            jobs::update_job_status(
                &ctx.pool,
                &job.id,
                JobStatus::Extracting,
                StatusUpdate {
                    stage_progress: Some(&progress),
                    keep_lock: true,
                    ..Default::default()
                },
            )
            .await?;
        }
    }

    job.ssot.assumptions = dedup_preserve(all_assumptions);
    job.ssot.exclusions = dedup_preserve(all_exclusions);

    // Missing width or height becomes a measurement task and flags the
    // item for review. Depth is optional for every configuration.
    let mut measurement_tasks = Vec::new();
    for item in &mut all_items {
        for (key, value) in [
            ("width", item.dimensions.width.value),
            ("height", item.dimensions.height.value),
        ] {
            if value.is_some() {
                continue;
            }
            measurement_tasks.push(MeasurementTask {
                task_id: Uuid::new_v4().to_string(),
                item_id: item.item_id.clone(),
                dimension_key: key.to_string(),
                status: "PENDING".to_string(),
                page_num: item.source_pages.first().copied().unwrap_or(0),
                calibration: None,
                measured_value: None,
                measured_by: None,
                measured_at: None,
            });
            item.add_flag(FLAG_NEEDS_REVIEW);
        }
    }

    for task in &measurement_tasks {
        if let Err(e) = measurements::insert_measurement_task(&ctx.pool, &job.id, task).await {
            warn!("Could not persist measurement task {}: {}", task.task_id, e);
        }
    }

    // High-DPI renders of the pages a human will measure on.
    let task_pages: BTreeSet<u32> = measurement_tasks.iter().map(|t| t.page_num).collect();
    for page_num in task_pages {
        if let Err(e) = renders::enqueue_render_request(
            &ctx.pool,
            &job.id,
            page_num,
            RenderKind::Measure,
            ctx.config.measure_dpi,
        )
        .await
        {
            warn!("Could not create MEASURE request for page {}: {}", page_num, e);
        }
    }

    let has_flags = !measurement_tasks.is_empty()
        || all_items
            .iter()
            .any(|i| i.has_flag(FLAG_NEEDS_REVIEW));
    job.ssot.items = all_items;
    job.ssot.measurement_tasks = measurement_tasks;

    let next_status = if has_flags {
        JobStatus::NeedsReview
    } else {
        JobStatus::Extracted
    };
    let progress = json!({
        "stage": "extracting",
        "status": "complete",
        "items_found": job.ssot.items.len(),
        "measurement_tasks": job.ssot.measurement_tasks.len(),
    });
    jobs::update_job_status(
        &ctx.pool,
        &job.id,
        next_status,
        StatusUpdate {
            ssot: Some(&job.ssot),
            stage_progress: Some(&progress),
            ..Default::default()
        },
    )
    .await?;
    job.status = next_status;

    info!(
        "EXTRACTING complete for job {}: {} items, {} tasks -> {}",
        job.id,
        job.ssot.items.len(),
        job.ssot.measurement_tasks.len(),
        next_status
    );
    Ok(())
}
