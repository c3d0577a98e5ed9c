//! Row models.
//!
//! Columns the worker does not touch are simply not selected, which keeps
//! the worker resilient to schema additions. Statuses and timestamps stay
//! as TEXT here; callers parse them through the protocol enums when they
//! need the typed form.

use sqlx::FromRow;

/// A claimed (or inspected) main job row.
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: String,
    pub project_id: String,
    pub status: String,
    pub ssot: String,
    pub stage_progress: Option<String>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub locked_at: Option<String>,
    pub locked_by: Option<String>,
}

/// A pending render request as returned by the claim query.
#[derive(Debug, Clone, FromRow)]
pub struct RenderRequest {
    pub id: String,
    pub job_id: String,
    pub page_num: i64,
    pub kind: String,
    pub dpi: i64,
}

/// Reference to a storage-object row, enough to delete blob and row.
#[derive(Debug, Clone, FromRow)]
pub struct StorageObjectRef {
    pub id: String,
    pub bucket: String,
    pub key: String,
}

/// A stale upload candidate: the job plus its (optional) blob row.
#[derive(Debug, Clone, FromRow)]
pub struct StaleUpload {
    pub job_id: String,
    pub object_id: Option<String>,
    pub bucket: Option<String>,
    pub key: Option<String>,
}

/// Latest pricebook version header.
#[derive(Debug, Clone, FromRow)]
pub struct PricebookVersion {
    pub id: String,
    pub version: i64,
    pub effective_date: Option<String>,
    pub notes: Option<String>,
}

/// An active pricing rule. `formula_json` and `applies_to` are JSON TEXT
/// columns interpreted by the pricing stage.
#[derive(Debug, Clone, FromRow)]
pub struct PricingRule {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub formula_json: Option<String>,
    pub applies_to: Option<String>,
}
