//! Apply context
//!
//! Per-pass state shared by every mapper invoked during one reconciliation:
//! the store handle, the cloud client cache and the memoization cache.
//! Created at the start of an apply invocation, discarded at the end, never
//! persisted. The memo maps are the only mutable substructure and their
//! mutation is confined to the crud wrappers.

use crate::client::{ClientCache, ClientHandle};
use crate::crud::Crud;
use crate::error::{EngineError, Result};
use crate::mapper::EntityMapper;
use crate::memo::{MemoCache, Side};
use crate::store::Store;
use converge_core::{EntityDescriptor, EntityId, Record};
use std::collections::HashMap;
use std::sync::Arc;

/// A mapper bound to its memoizing crud handles
#[derive(Clone)]
pub struct MapperRuntime {
    mapper: Arc<dyn EntityMapper>,
    pub db: Crud,
    pub cloud: Crud,
}

impl MapperRuntime {
    pub fn new(mapper: Arc<dyn EntityMapper>) -> Self {
        let descriptor = mapper.descriptor().clone();
        let db = Crud::new(Side::Db, descriptor.clone(), mapper.db());
        let cloud = Crud::new(Side::Cloud, descriptor, mapper.cloud());
        Self { mapper, db, cloud }
    }

    pub fn mapper(&self) -> &dyn EntityMapper {
        self.mapper.as_ref()
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        self.mapper.descriptor()
    }

    pub fn kind(&self) -> &'static str {
        self.mapper.descriptor().kind
    }
}

/// Shared state for one reconciliation pass
pub struct ApplyContext {
    store: Arc<dyn Store>,
    clients: ClientCache,
    memo: MemoCache,
    mappers: HashMap<&'static str, MapperRuntime>,
}

impl ApplyContext {
    pub fn new(
        store: Arc<dyn Store>,
        clients: ClientCache,
        mappers: impl IntoIterator<Item = Arc<dyn EntityMapper>>,
    ) -> Self {
        let mappers = mappers
            .into_iter()
            .map(|m| (m.descriptor().kind, MapperRuntime::new(m)))
            .collect();
        Self {
            store,
            clients,
            memo: MemoCache::new(),
            mappers,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn memo(&self) -> &MemoCache {
        &self.memo
    }

    /// Get the cached cloud client for a (service, region)
    pub async fn client(&self, service: &str, region: &str) -> Result<ClientHandle> {
        self.clients.get(service, region).await
    }

    /// The runtime for an entity kind, for cross-mapper resolution
    pub fn runtime(&self, kind: &str) -> Result<&MapperRuntime> {
        self.mappers
            .get(kind)
            .ok_or_else(|| EngineError::UnknownEntity(kind.to_string()))
    }

    pub fn runtimes(&self) -> impl Iterator<Item = &MapperRuntime> {
        self.mappers.values()
    }

    /// Resolve a relation: store snapshot first, then a live cloud read. A
    /// record that exists in the cloud but not yet in the store is
    /// materialized into the store before returning, so every mapper in the
    /// pass sees the same referenced record.
    pub async fn resolve(&self, kind: &str, id: &EntityId) -> Result<Option<Record>> {
        let runtime = self.runtime(kind)?;
        if let Some(record) = runtime.db.read(self, id).await? {
            return Ok(Some(record));
        }
        let Some(cloud_record) = runtime.cloud.read(self, id).await? else {
            return Ok(None);
        };
        tracing::debug!(kind, %id, "materializing cloud record into store");
        let created = runtime.db.create(vec![cloud_record], self).await?;
        Ok(created.into_iter().next())
    }

    /// Resolve a relation that must exist, mapping absence to a
    /// dependency-not-ready error the engine treats as retryable
    pub async fn resolve_required(&self, kind: &str, id: &EntityId) -> Result<Record> {
        self.resolve(kind, id)
            .await?
            .ok_or_else(|| EngineError::DependencyNotReady {
                kind: kind.to_string(),
                id: id.to_string(),
            })
    }
}
