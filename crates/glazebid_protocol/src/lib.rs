//! Shared domain types for the Glazebid worker.
//!
//! Everything the worker persists or exchanges with the rest of the
//! platform lives here: job and render statuses, the SSOT document that
//! rides on the job row, the dimension grammar, and the pre-generation
//! validation gate. The worker binary depends on this crate; the data
//! layer only needs the status enums.

pub mod dimension;
pub mod ssot;
pub mod status;
pub mod validate;

pub use ssot::{
    Breakdown, DimSource, DimValue, Dimensions, ItemCategory, LineItem, MeasurementTask,
    Metadata, OutputRecord, OutputType, PageClass, PageEntry, Pricing, Routing, RuleSnapshot,
    ScopeItem, Ssot, FLAG_NEEDS_REVIEW, FLAG_TO_BE_VERIFIED_IN_FIELD,
};
pub use status::{JobStatus, RenderKind, RenderRequestStatus, WorkerStatus};
pub use validate::{validate_for_generation, ValidationIssue};
