//! Store interface
//!
//! The engine treats the relational store as an external collaborator behind
//! this narrow trait. The only requirement is that writes are visible to
//! subsequent reads within the same pass.

use crate::error::Result;
use async_trait::async_trait;
use converge_core::{IdFields, Record};

/// Narrows a read to a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    /// Match by store surrogate key
    Key(u64),
    /// Match records whose identity field values equal every entry
    Fields(IdFields),
}

/// Record persistence boundary, scoped per entity kind
#[async_trait]
pub trait Store: Send + Sync {
    /// Read records of a kind; `filter` of `None` means list everything
    async fn read(&self, kind: &str, filter: Option<&RecordFilter>) -> Result<Vec<Record>>;

    /// Insert records, assigning surrogate keys where missing. Returns the
    /// persisted records with keys populated.
    async fn insert(&self, kind: &str, records: Vec<Record>) -> Result<Vec<Record>>;

    /// Overwrite records matched by surrogate key
    async fn update(&self, kind: &str, records: Vec<Record>) -> Result<Vec<Record>>;

    /// Remove records matched by surrogate key
    async fn delete(&self, kind: &str, records: Vec<Record>) -> Result<()>;
}

impl RecordFilter {
    /// Whether a record satisfies this filter. Identity field values are
    /// compared as id-part strings, matching how entity ids are generated.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            RecordFilter::Key(key) => record.key == Some(*key),
            RecordFilter::Fields(fields) => fields.iter().all(|(name, expected)| {
                record
                    .attribute(name)
                    .map(|v| match v {
                        serde_json::Value::String(s) => s == expected,
                        other => &other.to_string() == expected,
                    })
                    .unwrap_or(false)
            }),
        }
    }
}
