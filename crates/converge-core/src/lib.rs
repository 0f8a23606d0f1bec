//! Converge core types
//!
//! Shared vocabulary between the reconciliation engine and the per-resource
//! adapters: the [`Record`] shape that flows through every CRUD call, the
//! composite [`EntityId`] identity scheme, and the plan/report types produced
//! by a reconciliation pass.

pub mod entity;
pub mod error;
pub mod record;
pub mod report;

// Re-exports
pub use entity::{EntityDescriptor, EntityId, IdFields};
pub use error::{RecordError, Result};
pub use record::{EntityRef, Record};
pub use report::{
    ApplyFailure, ApplyReport, ChangeKind, Direction, EntityOutcome, Plan, PlanSummary,
    PlannedChange,
};
