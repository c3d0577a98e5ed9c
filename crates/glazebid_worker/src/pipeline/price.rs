//! PRICING stage: apply the active pricebook to the extracted items.
//!
//! Rule evaluation is pure; the stage loads the pricebook, prices every
//! item, and snapshots rules and line items into the SSOT. Line items a
//! human has overridden are copied through untouched, which is what
//! makes re-pricing idempotent.

use serde_json::{json, Value};
use tracing::info;

use glazebid_db::jobs::{self, StatusUpdate};
use glazebid_db::pricebook;
use glazebid_protocol::{
    Breakdown, ItemCategory, JobStatus, LineItem, Pricing, RuleSnapshot, ScopeItem,
};

use crate::context::WorkerContext;

use super::{JobState, StageError};

/// Per-sqft fallbacks when no rule prices an item.
const FALLBACK_SHOWER_RATE: f64 = 45.0;
const FALLBACK_MIRROR_RATE: f64 = 35.0;
const FALLBACK_SHOWER_DIMS: (f64, f64) = (36.0, 72.0);
const FALLBACK_MIRROR_DIMS: (f64, f64) = (30.0, 36.0);

/// Breakdown split per category: (glass, hardware, labor, other).
const SHOWER_SPLIT: (f64, f64, f64, f64) = (0.40, 0.25, 0.30, 0.05);
const MIRROR_SPLIT: (f64, f64, f64, f64) = (0.55, 0.10, 0.25, 0.10);

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// A pricing rule with its JSON columns parsed.
#[derive(Debug, Clone)]
pub struct RuleData {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub formula: Value,
    pub applies_to: Value,
}

/// The active pricebook, ready for evaluation.
#[derive(Debug, Clone, Default)]
pub struct PricebookData {
    pub version_id: Option<String>,
    pub snapshot_date: Option<String>,
    pub rules: Vec<RuleData>,
}

/// Does a rule's `applies_to` selector match an item? A null or empty
/// selector is universal.
pub fn rule_applies(applies_to: &Value, item: &ScopeItem) -> bool {
    let Some(selector) = applies_to.as_object() else {
        return true;
    };
    if selector.is_empty() {
        return true;
    }

    if let Some(category) = selector.get("category").and_then(Value::as_str) {
        if category != item.category.as_str() {
            return false;
        }
    }
    if let Some(configuration) = selector.get("configuration").and_then(Value::as_str) {
        if configuration != item.configuration {
            return false;
        }
    }
    true
}

/// Evaluate a formula against an item. An absent or unknown type prices
/// as `unit_price`.
pub fn evaluate_formula(formula: &Value, item: &ScopeItem) -> f64 {
    match formula.get("type").and_then(Value::as_str) {
        Some("per_sqft") => {
            let rate = formula.get("rate").and_then(Value::as_f64).unwrap_or(0.0);
            let width = item.dimensions.width.value.unwrap_or(0.0);
            let height = item.dimensions.height.value.unwrap_or(0.0);
            rate * (width * height / 144.0)
        }
        Some("fixed") => formula.get("amount").and_then(Value::as_f64).unwrap_or(0.0),
        _ => formula
            .get("unitPrice")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
    }
}

fn compute_breakdown(category: ItemCategory, unit_price: f64) -> Breakdown {
    let (glass, hardware, labor, other) = match category {
        ItemCategory::ShowerEnclosure => SHOWER_SPLIT,
        ItemCategory::VanityMirror => MIRROR_SPLIT,
    };
    Breakdown {
        glass: round2(unit_price * glass),
        hardware: round2(unit_price * hardware),
        labor: round2(unit_price * labor),
        other: round2(unit_price * other),
    }
}

fn title_case(s: &str) -> String {
    s.split(['-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn describe_item(item: &ScopeItem) -> String {
    let mut parts = vec![item.category.title().to_string()];
    if !item.configuration.is_empty() {
        parts.push(format!("({})", title_case(&item.configuration)));
    }
    if !item.location.is_empty() {
        parts.push(format!("at {}", item.location));
    }
    parts.join(" ")
}

fn fallback_unit_price(item: &ScopeItem) -> f64 {
    let (rate, (default_w, default_h)) = match item.category {
        ItemCategory::ShowerEnclosure => (FALLBACK_SHOWER_RATE, FALLBACK_SHOWER_DIMS),
        ItemCategory::VanityMirror => (FALLBACK_MIRROR_RATE, FALLBACK_MIRROR_DIMS),
    };
    let width = item.dimensions.width.value.unwrap_or(default_w);
    let height = item.dimensions.height.value.unwrap_or(default_h);
    rate * (width * height / 144.0)
}

/// Price a set of items. `previous` carries the prior pricing slice so
/// manual overrides survive a re-run byte for byte.
pub fn price_items(
    items: &[ScopeItem],
    previous: Option<&Pricing>,
    pricebook: &PricebookData,
) -> Pricing {
    let mut line_items = Vec::with_capacity(items.len());
    let mut subtotal = 0.0_f64;

    for item in items {
        if let Some(existing) = previous.and_then(|p| {
            p.line_items
                .iter()
                .find(|li| li.item_id == item.item_id && li.manual_override)
        }) {
            subtotal += existing.total_price;
            line_items.push(existing.clone());
            continue;
        }

        let mut unit_price = 0.0;
        let mut applied_rule = false;
        for rule in &pricebook.rules {
            if rule_applies(&rule.applies_to, item) {
                unit_price = evaluate_formula(&rule.formula, item);
                applied_rule = true;
                break;
            }
        }

        if unit_price == 0.0 && !applied_rule {
            unit_price = fallback_unit_price(item);
        }

        let quantity = item.quantity_per_unit.max(1);
        let total_price = round2(unit_price * quantity as f64);
        subtotal += total_price;

        line_items.push(LineItem {
            item_id: item.item_id.clone(),
            description: describe_item(item),
            unit_price: round2(unit_price),
            quantity,
            total_price,
            breakdown: compute_breakdown(item.category, unit_price),
            manual_override: false,
            override_reason: None,
        });
    }

    let subtotal = round2(subtotal);
    let tax = 0.0;
    Pricing {
        pricebook_version_id: pricebook.version_id.clone(),
        pricebook_snapshot_date: pricebook.snapshot_date.clone(),
        rules: pricebook
            .rules
            .iter()
            .map(|r| RuleSnapshot {
                rule_id: r.id.clone(),
                name: r.name.clone(),
                category: r.category.clone(),
                formula: r.formula.clone(),
                applies_to: r.applies_to.clone(),
            })
            .collect(),
        line_items,
        subtotal,
        tax,
        total: round2(subtotal + tax),
    }
}

async fn load_pricebook(ctx: &WorkerContext) -> Result<PricebookData, StageError> {
    let Some((version, rules)) = pricebook::active_pricebook(&ctx.pool).await? else {
        return Ok(PricebookData::default());
    };
    let parse = |raw: &Option<String>| -> Value {
        raw.as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(Value::Null)
    };
    Ok(PricebookData {
        version_id: Some(version.id),
        snapshot_date: version.effective_date,
        rules: rules
            .into_iter()
            .map(|r| RuleData {
                formula: parse(&r.formula_json),
                applies_to: parse(&r.applies_to),
                id: r.id,
                name: r.name,
                category: r.category,
            })
            .collect(),
    })
}

pub async fn run_pricing(ctx: &WorkerContext, job: &mut JobState) -> Result<(), StageError> {
    info!("Starting PRICING stage for job {}", job.id);
    jobs::update_job_status(
        &ctx.pool,
        &job.id,
        JobStatus::Pricing,
        StatusUpdate::keeping_lock(),
    )
    .await?;

    let pricebook = load_pricebook(ctx).await?;
    let pricing = price_items(&job.ssot.items, job.ssot.pricing.as_ref(), &pricebook);

    let progress = json!({
        "stage": "pricing",
        "status": "complete",
        "line_items": pricing.line_items.len(),
        "total": pricing.total,
    });
    info!(
        "PRICING complete for job {}: {} line items, subtotal {:.2}",
        job.id,
        pricing.line_items.len(),
        pricing.subtotal
    );

    job.ssot.pricing = Some(pricing);
    jobs::update_job_status(
        &ctx.pool,
        &job.id,
        JobStatus::Priced,
        StatusUpdate {
            ssot: Some(&job.ssot),
            stage_progress: Some(&progress),
            ..Default::default()
        },
    )
    .await?;
    job.status = JobStatus::Priced;
    Ok(())
}
