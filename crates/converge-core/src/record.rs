//! Record model
//!
//! A [`Record`] is one instance of a resource type, independent of which side
//! (store or cloud) it was observed on. User-settable attributes and
//! provider-assigned attributes live in separate maps so the engine can tell
//! configuration drift apart from identity/state drift.

use crate::entity::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A reference to another record by entity kind and id, never by embedding.
/// A subnet refers to its network; it does not own it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity kind of the referenced record (e.g. "network")
    pub kind: String,

    /// Composite entity id of the referenced record
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: impl Into<String>, id: EntityId) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }
}

/// A single resource record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-local surrogate key. `None` until the record has been persisted.
    /// Preserved across a replace cycle so references to the row stay valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<u64>,

    /// User-settable attributes (the desired configuration)
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,

    /// Provider-assigned attributes (identity and lifecycle state). These are
    /// never pushed back to the provider; drift here is resolved by
    /// overwriting the store's copy.
    #[serde(default)]
    pub assigned: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: u64) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_assigned(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assigned.insert(name.into(), value.into());
        self
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn set_assigned(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.assigned.insert(name.into(), value.into());
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn assigned(&self, name: &str) -> Option<&Value> {
        self.assigned.get(name)
    }

    /// Look up an attribute on either map, assigned side first. Identity
    /// fields usually live in `assigned` but some (a region, a name) are
    /// user-settable.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.assigned.get(name).or_else(|| self.fields.get(name))
    }

    /// Get a user field deserialized as a specific type
    pub fn field_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.fields
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get a provider-assigned field deserialized as a specific type
    pub fn assigned_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.assigned
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Read a relation stored as a user field
    pub fn relation(&self, name: &str) -> Option<EntityRef> {
        self.field_as(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, reference: &EntityRef) {
        // EntityRef serialization is a plain object, infallible
        if let Ok(v) = serde_json::to_value(reference) {
            self.fields.insert(name.into(), v);
        }
    }

    /// Names of user fields whose values differ between the two records
    pub fn changed_fields<'a>(&'a self, other: &'a Record) -> Vec<&'a str> {
        let mut changed: Vec<&str> = Vec::new();
        for (name, value) in &self.fields {
            if other.fields.get(name) != Some(value) {
                changed.push(name.as_str());
            }
        }
        for name in other.fields.keys() {
            if !self.fields.contains_key(name) {
                changed.push(name.as_str());
            }
        }
        changed.sort_unstable();
        changed.dedup();
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attribute_prefers_assigned() {
        let record = Record::new()
            .with_field("state", "desired")
            .with_assigned("state", "available");
        assert_eq!(record.attribute("state"), Some(&json!("available")));
        assert_eq!(record.attribute("missing"), None);
    }

    #[test]
    fn changed_fields_is_symmetric_on_names() {
        let a = Record::new()
            .with_field("cidr", "10.0.0.0/16")
            .with_field("tag", "one");
        let b = Record::new()
            .with_field("cidr", "10.1.0.0/16")
            .with_field("extra", true);
        let changed = a.changed_fields(&b);
        assert_eq!(changed, vec!["cidr", "extra", "tag"]);
        assert_eq!(b.changed_fields(&a), changed);
    }

    #[test]
    fn relations_round_trip() {
        let reference = EntityRef::new("network", EntityId::new("net-1|ap-east-1"));
        let mut record = Record::new();
        record.set_relation("network", &reference);
        assert_eq!(record.relation("network"), Some(reference));
    }
}
