//! In-memory implementation of the engine's [`Store`] trait.
//!
//! Rows live in per-kind tables keyed by surrogate key, with creation and
//! update timestamps kept alongside. Writes are visible to subsequent reads
//! immediately, which is the only ordering the engine relies on. Intended
//! for tests and for embedding the engine without a database.

use chrono::{DateTime, Utc};
use converge_core::Record;
use converge_engine::{EngineError, RecordFilter, Result, Store};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct Row {
    record: Record,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    next_key: u64,
    tables: HashMap<String, BTreeMap<u64, Row>>,
}

/// Thread-safe in-memory record store
#[derive(Debug, Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held for a kind
    pub fn len(&self, kind: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.tables.get(kind).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self, kind: &str) -> bool {
        self.len(kind) == 0
    }

    /// Creation and last-update times for one row, if it exists
    pub fn timestamps(&self, kind: &str, key: u64) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let inner = self.inner.lock().unwrap();
        inner
            .tables
            .get(kind)?
            .get(&key)
            .map(|row| (row.created_at, row.updated_at))
    }
}

#[async_trait::async_trait]
impl Store for MemStore {
    async fn read(&self, kind: &str, filter: Option<&RecordFilter>) -> Result<Vec<Record>> {
        let inner = self.inner.lock().unwrap();
        let Some(table) = inner.tables.get(kind) else {
            return Ok(Vec::new());
        };
        let records = table
            .values()
            .filter(|row| filter.is_none_or(|f| f.matches(&row.record)))
            .map(|row| row.record.clone())
            .collect();
        Ok(records)
    }

    async fn insert(&self, kind: &str, records: Vec<Record>) -> Result<Vec<Record>> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let mut persisted = Vec::with_capacity(records.len());
        for mut record in records {
            let key = match record.key {
                Some(key) => key,
                None => {
                    inner.next_key += 1;
                    inner.next_key
                }
            };
            inner.next_key = inner.next_key.max(key);
            let table = inner.tables.entry(kind.to_string()).or_default();
            if table.contains_key(&key) {
                return Err(EngineError::Store(format!(
                    "{kind}: duplicate key {key} on insert"
                )));
            }
            record.key = Some(key);
            tracing::debug!(kind, key, "memstore insert");
            table.insert(
                key,
                Row {
                    record: record.clone(),
                    created_at: now,
                    updated_at: now,
                },
            );
            persisted.push(record);
        }
        Ok(persisted)
    }

    async fn update(&self, kind: &str, records: Vec<Record>) -> Result<Vec<Record>> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let mut persisted = Vec::with_capacity(records.len());
        for record in records {
            let Some(key) = record.key else {
                return Err(EngineError::Store(format!(
                    "{kind}: update requires a surrogate key"
                )));
            };
            let row = inner
                .tables
                .get_mut(kind)
                .and_then(|table| table.get_mut(&key))
                .ok_or_else(|| {
                    EngineError::Store(format!("{kind}: no row with key {key}"))
                })?;
            tracing::debug!(kind, key, "memstore update");
            row.record = record.clone();
            row.updated_at = now;
            persisted.push(record);
        }
        Ok(persisted)
    }

    async fn delete(&self, kind: &str, records: Vec<Record>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for record in records {
            // Rows without a key were never persisted; nothing to remove
            let Some(key) = record.key else { continue };
            if let Some(table) = inner.tables.get_mut(kind) {
                tracing::debug!(kind, key, "memstore delete");
                table.remove(&key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_assigns_sequential_keys() {
        let store = MemStore::new();
        let persisted = store
            .insert(
                "network",
                vec![
                    Record::new().with_field("cidr", "10.0.0.0/16"),
                    Record::new().with_field("cidr", "10.1.0.0/16"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(persisted[0].key, Some(1));
        assert_eq!(persisted[1].key, Some(2));
        assert_eq!(store.len("network"), 2);
    }

    #[tokio::test]
    async fn explicit_keys_advance_the_sequence() {
        let store = MemStore::new();
        store
            .insert("network", vec![Record::new().with_key(10)])
            .await
            .unwrap();
        let persisted = store
            .insert("network", vec![Record::new()])
            .await
            .unwrap();
        assert_eq!(persisted[0].key, Some(11));
    }

    #[tokio::test]
    async fn read_honors_field_filters() {
        let store = MemStore::new();
        store
            .insert(
                "network",
                vec![
                    Record::new()
                        .with_field("region", "ap-east-1")
                        .with_assigned("network_id", "net-1"),
                    Record::new()
                        .with_field("region", "ap-west-2")
                        .with_assigned("network_id", "net-2"),
                ],
            )
            .await
            .unwrap();

        let mut fields = converge_core::IdFields::new();
        fields.insert("network_id".into(), "net-1".into());
        fields.insert("region".into(), "ap-east-1".into());
        let found = store
            .read("network", Some(&RecordFilter::Fields(fields)))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, Some(1));
    }

    #[tokio::test]
    async fn update_overwrites_and_bumps_timestamp() {
        let store = MemStore::new();
        let persisted = store
            .insert("network", vec![Record::new().with_field("cidr", "10.0.0.0/16")])
            .await
            .unwrap();
        let key = persisted[0].key.unwrap();
        let (created, _) = store.timestamps("network", key).unwrap();

        let mut changed = persisted[0].clone();
        changed
            .fields
            .insert("cidr".into(), serde_json::json!("10.2.0.0/16"));
        store.update("network", vec![changed]).await.unwrap();

        let rows = store
            .read("network", Some(&RecordFilter::Key(key)))
            .await
            .unwrap();
        assert_eq!(rows[0].fields["cidr"], serde_json::json!("10.2.0.0/16"));
        let (created_after, updated_after) = store.timestamps("network", key).unwrap();
        assert_eq!(created, created_after);
        assert!(updated_after >= created_after);
    }

    #[tokio::test]
    async fn update_of_unknown_key_is_an_error() {
        let store = MemStore::new();
        let err = store
            .update("network", vec![Record::new().with_key(99)])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
    }

    #[tokio::test]
    async fn delete_removes_matched_rows() {
        let store = MemStore::new();
        let persisted = store
            .insert("network", vec![Record::new(), Record::new()])
            .await
            .unwrap();
        store
            .delete("network", vec![persisted[0].clone()])
            .await
            .unwrap();
        assert_eq!(store.len("network"), 1);
    }
}
