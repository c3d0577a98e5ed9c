//! Status enums shared between the data layer and the worker.
//!
//! All of these are stored as TEXT in their SCREAMING_SNAKE_CASE wire
//! form; `as_str`/`FromStr` own that mapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a main job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Uploading,
    Uploaded,
    Indexing,
    Indexed,
    Routing,
    Routed,
    Extracting,
    Extracted,
    NeedsReview,
    Reviewed,
    Pricing,
    Priced,
    Generating,
    Done,
    Failed,
}

impl JobStatus {
    /// Statuses a worker may claim from.
    pub const CLAIMABLE: &'static [JobStatus] =
        &[JobStatus::Uploaded, JobStatus::Reviewed, JobStatus::Priced];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "CREATED",
            JobStatus::Uploading => "UPLOADING",
            JobStatus::Uploaded => "UPLOADED",
            JobStatus::Indexing => "INDEXING",
            JobStatus::Indexed => "INDEXED",
            JobStatus::Routing => "ROUTING",
            JobStatus::Routed => "ROUTED",
            JobStatus::Extracting => "EXTRACTING",
            JobStatus::Extracted => "EXTRACTED",
            JobStatus::NeedsReview => "NEEDS_REVIEW",
            JobStatus::Reviewed => "REVIEWED",
            JobStatus::Pricing => "PRICING",
            JobStatus::Priced => "PRICED",
            JobStatus::Generating => "GENERATING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Terminal statuses clear the lock and never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(JobStatus::Created),
            "UPLOADING" => Ok(JobStatus::Uploading),
            "UPLOADED" => Ok(JobStatus::Uploaded),
            "INDEXING" => Ok(JobStatus::Indexing),
            "INDEXED" => Ok(JobStatus::Indexed),
            "ROUTING" => Ok(JobStatus::Routing),
            "ROUTED" => Ok(JobStatus::Routed),
            "EXTRACTING" => Ok(JobStatus::Extracting),
            "EXTRACTED" => Ok(JobStatus::Extracted),
            "NEEDS_REVIEW" => Ok(JobStatus::NeedsReview),
            "REVIEWED" => Ok(JobStatus::Reviewed),
            "PRICING" => Ok(JobStatus::Pricing),
            "PRICED" => Ok(JobStatus::Priced),
            "GENERATING" => Ok(JobStatus::Generating),
            "DONE" => Ok(JobStatus::Done),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: '{}'", s)),
        }
    }
}

/// What a render request is for. MEASURE renders gate extraction review
/// and are claimed ahead of THUMB regardless of age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderKind {
    Thumb,
    Measure,
}

impl RenderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderKind::Thumb => "THUMB",
            RenderKind::Measure => "MEASURE",
        }
    }

    /// Key prefix used in the page-cache bucket.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            RenderKind::Thumb => "thumb",
            RenderKind::Measure => "measure",
        }
    }
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RenderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "THUMB" => Ok(RenderKind::Thumb),
            "MEASURE" => Ok(RenderKind::Measure),
            _ => Err(format!("Invalid render kind: '{}'", s)),
        }
    }
}

/// Status of a render request row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderRequestStatus {
    Pending,
    Done,
    Failed,
}

impl RenderRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderRequestStatus::Pending => "PENDING",
            RenderRequestStatus::Done => "DONE",
            RenderRequestStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RenderRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RenderRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RenderRequestStatus::Pending),
            "DONE" => Ok(RenderRequestStatus::Done),
            "FAILED" => Ok(RenderRequestStatus::Failed),
            _ => Err(format!("Invalid render request status: '{}'", s)),
        }
    }
}

/// Observational worker state published with heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Idle,
    Processing,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Idle => "IDLE",
            WorkerStatus::Processing => "PROCESSING",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
