//! Plan and apply report types
//!
//! A dry run produces a [`Plan`]; a real pass produces an [`ApplyReport`]
//! with per-entity-kind outcome counters and any per-record failures that
//! did not halt the pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which way drift is resolved for records that exist on only one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The store wins: cloud-only resources are deleted, store-only ones
    /// created in the cloud
    Provision,
    /// The cloud wins: cloud-only resources are adopted into the store,
    /// store-only rows removed
    Import,
}

/// How a single record pair is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Create the resource in the cloud
    Create,
    /// Mutate the live resource in place
    Update,
    /// Destroy and recreate, keeping the store surrogate key
    Replace,
    /// Delete the resource
    Delete,
    /// Overwrite the store copy with the cloud copy; no cloud mutation
    Restore,
    /// Insert a cloud-discovered resource into the store
    Adopt,
    /// Already converged
    NoOp,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Create => write!(f, "create"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Replace => write!(f, "replace"),
            ChangeKind::Delete => write!(f, "delete"),
            ChangeKind::Restore => write!(f, "restore"),
            ChangeKind::Adopt => write!(f, "adopt"),
            ChangeKind::NoOp => write!(f, "no-op"),
        }
    }
}

/// One planned change for one record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedChange {
    /// Entity kind (e.g. "network")
    pub entity: String,

    /// Entity id of the affected record
    pub entity_id: String,

    /// How the mismatch would be resolved
    pub action: ChangeKind,
}

/// Result of a dry run: every change a pass would perform, in module order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub changes: Vec<PlannedChange>,
    pub has_changes: bool,
}

impl Plan {
    pub fn new(changes: Vec<PlannedChange>) -> Self {
        let has_changes = changes.iter().any(|c| c.action != ChangeKind::NoOp);
        Self {
            changes,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self {
            changes: Vec::new(),
            has_changes: false,
        }
    }

    pub fn changes_by_action(&self, action: ChangeKind) -> Vec<&PlannedChange> {
        self.changes.iter().filter(|c| c.action == action).collect()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.changes_by_action(ChangeKind::Create).len(),
            update: self.changes_by_action(ChangeKind::Update).len(),
            replace: self.changes_by_action(ChangeKind::Replace).len(),
            delete: self.changes_by_action(ChangeKind::Delete).len(),
            restore: self.changes_by_action(ChangeKind::Restore).len(),
            adopt: self.changes_by_action(ChangeKind::Adopt).len(),
            unchanged: self.changes_by_action(ChangeKind::NoOp).len(),
        }
    }
}

/// Summary of a plan's actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub restore: usize,
    pub adopt: usize,
    pub unchanged: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete, {} to restore, {} to adopt, {} unchanged",
            self.create, self.update, self.replace, self.delete, self.restore, self.adopt, self.unchanged
        )
    }
}

/// Outcome counters for one entity kind after a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityOutcome {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub restored: usize,
    pub adopted: usize,
    pub unchanged: usize,
}

impl EntityOutcome {
    pub fn record(&mut self, action: ChangeKind) {
        match action {
            ChangeKind::Create => self.created += 1,
            ChangeKind::Update => self.updated += 1,
            ChangeKind::Replace => self.replaced += 1,
            ChangeKind::Delete => self.deleted += 1,
            ChangeKind::Restore => self.restored += 1,
            ChangeKind::Adopt => self.adopted += 1,
            ChangeKind::NoOp => self.unchanged += 1,
        }
    }

    /// Number of operations that touched the cloud or the store
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted + self.restored + self.adopted
    }
}

/// A per-record failure that did not abort the pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyFailure {
    pub entity: String,
    pub entity_id: String,
    pub action: ChangeKind,
    pub error: String,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Per-entity-kind outcome counters
    pub outcomes: BTreeMap<String, EntityOutcome>,

    /// Record-level failures; siblings in the same batch still completed
    pub failures: Vec<ApplyFailure>,

    /// Modules skipped because a dependency failed
    pub skipped_modules: Vec<String>,

    /// The first error that stopped topological progress, if any
    pub fatal: Option<String>,

    /// Total pass time in milliseconds
    pub duration_ms: u64,
}

impl ApplyReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.fatal.is_none()
    }

    pub fn outcome(&self, entity: &str) -> EntityOutcome {
        self.outcomes.get(entity).copied().unwrap_or_default()
    }

    pub fn record(&mut self, entity: &str, action: ChangeKind) {
        self.outcomes.entry(entity.to_string()).or_default().record(action);
    }

    pub fn record_failure(
        &mut self,
        entity: &str,
        entity_id: impl Into<String>,
        action: ChangeKind,
        error: impl std::fmt::Display,
    ) {
        self.failures.push(ApplyFailure {
            entity: entity.to_string(),
            entity_id: entity_id.into(),
            action,
            error: error.to_string(),
        });
    }

    /// Total cloud/store mutations across all entity kinds
    pub fn total_changes(&self) -> usize {
        self.outcomes.values().map(|o| o.changes()).sum()
    }
}
