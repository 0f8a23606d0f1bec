//! Entity identity
//!
//! Every record is identified by a composite [`EntityId`] derived from the
//! minimal cloud-identifying fields of its entity kind (e.g. resource id +
//! region), joined with `|`. The descriptor's `generate_id` and `id_fields`
//! are exact inverses, and a record whose identity fields are not yet
//! populated (a freshly inserted desired row) falls back to its store
//! surrogate key so it still partitions uniquely.

use crate::error::{RecordError, Result};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

const ID_SEPARATOR: char = '|';

/// Named identity field values, as extracted from or used to build an
/// [`EntityId`]
pub type IdFields = BTreeMap<String, String>;

/// Composite identity of a record within a cloud account scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(&ID_SEPARATOR.to_string());
        Self(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parts(&self) -> Vec<&str> {
        self.0.split(ID_SEPARATOR).collect()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Shape descriptor for one entity kind: its name and the ordered set of
/// fields that make up its cloud identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Entity kind, unique across all registered modules (e.g. "network")
    pub kind: &'static str,

    /// Ordered identity fields. Values are looked up on the record's
    /// assigned map first, then the user fields.
    pub id_fields: &'static [&'static str],
}

impl EntityDescriptor {
    pub const fn new(kind: &'static str, id_fields: &'static [&'static str]) -> Self {
        Self { kind, id_fields }
    }

    /// Derive the entity id of a record. Falls back to the surrogate key when
    /// any identity field is missing, so not-yet-created records stay
    /// addressable and never collide with live cloud identities by accident.
    pub fn entity_id(&self, record: &Record) -> EntityId {
        let mut parts = Vec::with_capacity(self.id_fields.len());
        for field in self.id_fields {
            match record.attribute(field).map(value_to_id_part) {
                Some(part) if !part.is_empty() => parts.push(part),
                _ => return self.surrogate_id(record),
            }
        }
        if parts.is_empty() {
            return self.surrogate_id(record);
        }
        EntityId::from_parts(parts)
    }

    /// Build an entity id from named field values. The field set must match
    /// the descriptor exactly; this is the inverse of [`Self::id_fields_of`].
    pub fn generate_id(&self, fields: &IdFields) -> Result<EntityId> {
        let expected: Vec<String> = self.id_fields.iter().map(|f| f.to_string()).collect();
        let got: Vec<String> = fields.keys().cloned().collect();
        if fields.len() != self.id_fields.len()
            || !self.id_fields.iter().all(|f| fields.contains_key(*f))
        {
            return Err(RecordError::IdFieldMismatch {
                kind: self.kind.to_string(),
                expected,
                got,
            });
        }
        Ok(EntityId::from_parts(
            self.id_fields.iter().map(|f| fields[*f].as_str()),
        ))
    }

    /// Split an entity id back into its named field values. Exact inverse of
    /// [`Self::generate_id`].
    pub fn id_fields_of(&self, id: &EntityId) -> Result<IdFields> {
        let parts = id.parts();
        if parts.len() != self.id_fields.len() {
            return Err(RecordError::IdArityMismatch {
                kind: self.kind.to_string(),
                id: id.to_string(),
                expected: self.id_fields.len(),
            });
        }
        Ok(self
            .id_fields
            .iter()
            .zip(parts)
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }

    fn surrogate_id(&self, record: &Record) -> EntityId {
        match record.key {
            Some(key) => EntityId::new(key.to_string()),
            None => EntityId::new(""),
        }
    }
}

fn value_to_id_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
