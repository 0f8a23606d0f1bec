//! Per-pass memoization cache
//!
//! Two snapshots, one per side, each keyed by entity kind then entity id.
//! Reads within a pass go through the cache so every mapper consulting the
//! same referenced entity observes one consistent view. An in-flight id read
//! plants a [`Slot::Pending`] placeholder; a reentrant read of the same id
//! sees the placeholder and short-circuits instead of recursing, which is
//! what bounds mutual-dependency resolution.

use converge_core::{EntityId, Record};
use std::collections::HashMap;
use std::sync::Mutex;

/// Which snapshot a crud executor operates against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Db,
    Cloud,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Db => write!(f, "db"),
            Side::Cloud => write!(f, "cloud"),
        }
    }
}

#[derive(Debug, Clone)]
enum Slot {
    /// A read for this id is in flight
    Pending,
    Ready(Record),
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum MemoLookup {
    Hit(Record),
    /// A read for this id is already in flight higher up the call stack
    Pending,
    Miss,
}

type SideMap = HashMap<String, HashMap<EntityId, Slot>>;

/// Snapshot of already-observed records, scoped to one apply pass
#[derive(Default)]
pub struct MemoCache {
    inner: Mutex<(SideMap, SideMap)>,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_side<R>(&self, side: Side, f: impl FnOnce(&mut SideMap) -> R) -> R {
        let mut inner = self.inner.lock().expect("memo cache poisoned");
        match side {
            Side::Db => f(&mut inner.0),
            Side::Cloud => f(&mut inner.1),
        }
    }

    pub fn lookup(&self, side: Side, kind: &str, id: &EntityId) -> MemoLookup {
        self.with_side(side, |map| {
            match map.get(kind).and_then(|records| records.get(id)) {
                Some(Slot::Ready(record)) => MemoLookup::Hit(record.clone()),
                Some(Slot::Pending) => MemoLookup::Pending,
                None => MemoLookup::Miss,
            }
        })
    }

    /// Reserve an id before an executor read so reentrant reads for the same
    /// id short-circuit. Returns false if the id is already present.
    pub fn reserve(&self, side: Side, kind: &str, id: &EntityId) -> bool {
        self.with_side(side, |map| {
            let records = map.entry(kind.to_string()).or_default();
            if records.contains_key(id) {
                return false;
            }
            records.insert(id.clone(), Slot::Pending);
            true
        })
    }

    pub fn store(&self, side: Side, kind: &str, id: EntityId, record: Record) {
        self.with_side(side, |map| {
            map.entry(kind.to_string())
                .or_default()
                .insert(id, Slot::Ready(record));
        });
    }

    /// Drop an entry, including a pending placeholder for a failed or empty
    /// read
    pub fn evict(&self, side: Side, kind: &str, id: &EntityId) {
        self.with_side(side, |map| {
            if let Some(records) = map.get_mut(kind) {
                records.remove(id);
            }
        });
    }

    /// All ready records of a kind, sorted by entity id for determinism
    pub fn snapshot(&self, side: Side, kind: &str) -> Vec<(EntityId, Record)> {
        self.with_side(side, |map| {
            let mut records: Vec<(EntityId, Record)> = map
                .get(kind)
                .map(|slots| {
                    slots
                        .iter()
                        .filter_map(|(id, slot)| match slot {
                            Slot::Ready(record) => Some((id.clone(), record.clone())),
                            Slot::Pending => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            records.sort_by(|a, b| a.0.cmp(&b.0));
            records
        })
    }

    pub fn clear(&self, side: Side) {
        self.with_side(side, |map| map.clear());
    }
}
