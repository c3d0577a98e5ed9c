//! The SSOT document carried on the job row.
//!
//! Stages read the whole tree, mutate their slice, and write it back while
//! holding the job lock, so no merge protocol is needed. Every struct uses
//! camelCase field names on the wire and defaults for absent slices, and
//! the root keeps unknown keys in `extra` so slices owned by the front-end
//! survive a worker round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Flag set on items that a human must look at before pricing.
pub const FLAG_NEEDS_REVIEW: &str = "NEEDS_REVIEW";
/// Flag set on items whose dimensions are unknown at extraction time.
pub const FLAG_TO_BE_VERIFIED_IN_FIELD: &str = "TO_BE_VERIFIED_IN_FIELD";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ssot {
    pub metadata: Metadata,
    pub page_index: Vec<PageEntry>,
    pub routing: Routing,
    pub items: Vec<ScopeItem>,
    pub measurement_tasks: Vec<MeasurementTask>,
    pub assumptions: Vec<String>,
    pub exclusions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    pub outputs: Vec<OutputRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Ssot {
    /// True when any item carries the NEEDS_REVIEW flag.
    pub fn needs_review(&self) -> bool {
        self.items
            .iter()
            .any(|i| i.flags.iter().any(|f| f == FLAG_NEEDS_REVIEW))
    }
}

/// Project/client info owned by the front-end; the worker only fills
/// `pageCount`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metadata {
    pub page_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Page classification produced by the INDEXING stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageClass {
    Title,
    FloorPlan,
    Elevation,
    Schedule,
    Detail,
    Notes,
    Irrelevant,
}

impl PageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageClass::Title => "TITLE",
            PageClass::FloorPlan => "FLOOR_PLAN",
            PageClass::Elevation => "ELEVATION",
            PageClass::Schedule => "SCHEDULE",
            PageClass::Detail => "DETAIL",
            PageClass::Notes => "NOTES",
            PageClass::Irrelevant => "IRRELEVANT",
        }
    }
}

impl fmt::Display for PageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEntry {
    pub page_num: u32,
    pub classification: PageClass,
    pub confidence: f64,
    #[serde(default)]
    pub relevant_to: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Routing {
    pub relevant_pages: Vec<u32>,
    pub total_pages: u32,
}

impl Routing {
    pub fn is_empty(&self) -> bool {
        self.relevant_pages.is_empty() && self.total_pages == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCategory {
    ShowerEnclosure,
    VanityMirror,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::ShowerEnclosure => "SHOWER_ENCLOSURE",
            ItemCategory::VanityMirror => "VANITY_MIRROR",
        }
    }

    /// Humanized form used in line-item descriptions.
    pub fn title(&self) -> &'static str {
        match self {
            ItemCategory::ShowerEnclosure => "Shower Enclosure",
            ItemCategory::VanityMirror => "Vanity Mirror",
        }
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHOWER_ENCLOSURE" => Ok(ItemCategory::ShowerEnclosure),
            "VANITY_MIRROR" => Ok(ItemCategory::VanityMirror),
            _ => Err(format!("Invalid item category: '{}'", s)),
        }
    }
}

/// Where a dimension value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DimSource {
    DimensionCallout,
    FieldVerify,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimValue {
    pub value: Option<f64>,
    pub unit: String,
    pub source: DimSource,
    pub confidence: f64,
}

impl DimValue {
    pub fn from_callout(value: f64) -> Self {
        DimValue {
            value: Some(value),
            unit: "in".to_string(),
            source: DimSource::DimensionCallout,
            confidence: 0.7,
        }
    }

    pub fn field_verify() -> Self {
        DimValue {
            value: None,
            unit: "in".to_string(),
            source: DimSource::FieldVerify,
            confidence: 0.0,
        }
    }
}

impl Default for DimValue {
    fn default() -> Self {
        DimValue::field_verify()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dimensions {
    pub width: DimValue,
    pub height: DimValue,
    pub depth: DimValue,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeItem {
    pub item_id: String,
    pub category: ItemCategory,
    #[serde(default)]
    pub unit_id: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub configuration: String,
    #[serde(default)]
    pub template_id: String,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub glass_type: String,
    #[serde(default)]
    pub hardware: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub source_pages: Vec<u32>,
    #[serde(default = "default_quantity")]
    pub quantity_per_unit: u32,
}

impl ScopeItem {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    pub fn add_flag(&mut self, flag: &str) {
        if !self.has_flag(flag) {
            self.flags.push(flag.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementTask {
    pub task_id: String,
    pub item_id: String,
    pub dimension_key: String,
    pub status: String,
    pub page_num: u32,
    #[serde(default)]
    pub calibration: Option<Value>,
    #[serde(default)]
    pub measured_value: Option<f64>,
    #[serde(default)]
    pub measured_by: Option<String>,
    #[serde(default)]
    pub measured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Breakdown {
    pub glass: f64,
    pub hardware: f64,
    pub labor: f64,
    pub other: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub item_id: String,
    pub description: String,
    pub unit_price: f64,
    pub quantity: u32,
    pub total_price: f64,
    pub breakdown: Breakdown,
    #[serde(default)]
    pub manual_override: bool,
    #[serde(default)]
    pub override_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSnapshot {
    pub rule_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub formula: Value,
    #[serde(default)]
    pub applies_to: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pricing {
    pub pricebook_version_id: Option<String>,
    pub pricebook_snapshot_date: Option<String>,
    pub rules: Vec<RuleSnapshot>,
    pub line_items: Vec<LineItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputType {
    BidPdf,
    ShopDrawingsPdf,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::BidPdf => "BID_PDF",
            OutputType::ShopDrawingsPdf => "SHOP_DRAWINGS_PDF",
        }
    }

    /// Artifact filename stem (`bid-v3.pdf`, `shop-drawings-v1.pdf`).
    pub fn file_stem(&self) -> &'static str {
        match self {
            OutputType::BidPdf => "bid",
            OutputType::ShopDrawingsPdf => "shop-drawings",
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub output_id: String,
    #[serde(rename = "type")]
    pub output_type: OutputType,
    pub version: u32,
    pub bucket: String,
    pub key: String,
    pub generated_at: DateTime<Utc>,
    pub sha256: String,
}
