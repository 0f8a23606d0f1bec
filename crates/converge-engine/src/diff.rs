//! Desired/actual record set partitioning
//!
//! Records from both sides are keyed by entity id and split into the four
//! buckets the apply loop resolves. Iteration order is sorted by entity id
//! so a pass is deterministic.

use converge_core::{EntityId, Record};
use std::collections::BTreeMap;

/// Partition of one entity kind's records for one pass
#[derive(Debug, Default)]
pub struct Diff {
    /// In the store but not the cloud: candidates for cloud create
    pub desired_only: Vec<(EntityId, Record)>,

    /// In the cloud but not the store: adopted or deleted depending on the
    /// pass direction
    pub actual_only: Vec<(EntityId, Record)>,

    /// Present on both sides with the drift predicate failing: (desired,
    /// actual) pairs
    pub changed: Vec<(EntityId, Record, Record)>,

    /// Present on both sides and already converged
    pub unchanged: Vec<EntityId>,
}

impl Diff {
    pub fn is_converged(&self) -> bool {
        self.desired_only.is_empty() && self.actual_only.is_empty() && self.changed.is_empty()
    }
}

/// Partition desired vs. actual records by entity id
pub fn partition(
    desired: Vec<(EntityId, Record)>,
    actual: Vec<(EntityId, Record)>,
    equals: impl Fn(&Record, &Record) -> bool,
) -> Diff {
    let mut actual_by_id: BTreeMap<EntityId, Record> = actual.into_iter().collect();
    let mut diff = Diff::default();

    let desired_sorted: BTreeMap<EntityId, Record> = desired.into_iter().collect();
    for (id, desired_record) in desired_sorted {
        match actual_by_id.remove(&id) {
            None => diff.desired_only.push((id, desired_record)),
            Some(actual_record) => {
                if equals(&desired_record, &actual_record) {
                    diff.unchanged.push(id);
                } else {
                    diff.changed.push((id, desired_record, actual_record));
                }
            }
        }
    }
    for (id, actual_record) in actual_by_id {
        diff.actual_only.push((id, actual_record));
    }
    diff
}
