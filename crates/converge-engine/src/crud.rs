//! CRUD execution
//!
//! [`CrudExecutor`] is the batched create/read/update/delete contract an
//! adapter implements for one side (store or cloud). [`Crud`] wraps an
//! executor with the per-pass memoization protocol: creates reserve their
//! entity ids up front, id reads are read-through with a reentrancy guard,
//! deletes evict. [`StoreCrud`] is the auto-derived store-side executor most
//! mappers use unchanged.

use crate::context::ApplyContext;
use crate::error::Result;
use crate::memo::{MemoLookup, Side};
use crate::store::RecordFilter;
use async_trait::async_trait;
use converge_core::{EntityDescriptor, EntityId, Record};
use std::sync::Arc;

/// Whether a detected mismatch can be resolved in place or needs
/// destroy-and-recreate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrReplace {
    Update,
    Replace,
}

/// Batched CRUD against one side. All operations take zero or more records;
/// a failure for one record must not corrupt its siblings.
#[async_trait]
pub trait CrudExecutor: Send + Sync {
    /// Create records and return them with identity fields populated. Must
    /// be observably complete: an immediate read of the returned id yields a
    /// record the mapper's equality predicate accepts.
    async fn create(&self, records: Vec<Record>, ctx: &ApplyContext) -> Result<Vec<Record>>;

    /// Read one record by id, or everything visible when `id` is `None`.
    /// Absence is an empty result, not an error.
    async fn read(&self, ctx: &ApplyContext, id: Option<&EntityId>) -> Result<Vec<Record>>;

    /// Apply in-place changes. A cloud executor without a true update verb
    /// may create-then-delete internally behind this signature.
    async fn update(&self, records: Vec<Record>, ctx: &ApplyContext) -> Result<Vec<Record>>;

    /// Remove records from this side
    async fn delete(&self, records: Vec<Record>, ctx: &ApplyContext) -> Result<()>;

    /// The single decision point for update-vs-replace. Only consulted on
    /// the cloud side; defaults to always-update.
    fn update_or_replace(&self, _old: &Record, _new: &Record) -> UpdateOrReplace {
        UpdateOrReplace::Update
    }
}

/// A memoizing handle over one side's executor for one entity kind
#[derive(Clone)]
pub struct Crud {
    side: Side,
    descriptor: EntityDescriptor,
    exec: Arc<dyn CrudExecutor>,
}

impl Crud {
    pub fn new(side: Side, descriptor: EntityDescriptor, exec: Arc<dyn CrudExecutor>) -> Self {
        Self {
            side,
            descriptor,
            exec,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    /// Create records, reserving their current ids in the memo so sibling
    /// resolution within the batch finds them, then re-memoizing under the
    /// post-create identity.
    pub async fn create(&self, records: Vec<Record>, ctx: &ApplyContext) -> Result<Vec<Record>> {
        let kind = self.descriptor.kind;
        tracing::debug!(kind, side = %self.side, count = records.len(), "crud create");
        let reserved: Vec<EntityId> = records
            .iter()
            .map(|r| {
                let id = self.descriptor.entity_id(r);
                ctx.memo().store(self.side, kind, id.clone(), r.clone());
                id
            })
            .collect();
        let created = match self.exec.create(records, ctx).await {
            Ok(created) => created,
            Err(err) => {
                for id in &reserved {
                    ctx.memo().evict(self.side, kind, id);
                }
                return Err(err);
            }
        };
        // Identity fields may have been populated; move the memo entries to
        // the new ids
        for id in &reserved {
            ctx.memo().evict(self.side, kind, id);
        }
        for record in &created {
            let id = self.descriptor.entity_id(record);
            ctx.memo().store(self.side, kind, id, record.clone());
        }
        Ok(created)
    }

    /// Read-through single-record fetch. A reentrant read for an id already
    /// being fetched observes the pending placeholder and returns `None`,
    /// which bounds mutual-dependency recursion; adapters treat that as
    /// dependency-not-ready.
    pub async fn read(&self, ctx: &ApplyContext, id: &EntityId) -> Result<Option<Record>> {
        let kind = self.descriptor.kind;
        match ctx.memo().lookup(self.side, kind, id) {
            MemoLookup::Hit(record) => {
                tracing::debug!(kind, side = %self.side, %id, "cache hit");
                return Ok(Some(record));
            }
            MemoLookup::Pending => {
                tracing::debug!(kind, side = %self.side, %id, "reentrant read short-circuited");
                return Ok(None);
            }
            MemoLookup::Miss => {
                tracing::debug!(kind, side = %self.side, %id, "cache miss");
            }
        }
        ctx.memo().reserve(self.side, kind, id);
        let fetched = match self.exec.read(ctx, Some(id)).await {
            Ok(fetched) => fetched,
            Err(err) => {
                ctx.memo().evict(self.side, kind, id);
                return Err(err);
            }
        };
        match fetched.into_iter().next() {
            Some(record) => {
                ctx.memo().store(self.side, kind, id.clone(), record.clone());
                Ok(Some(record))
            }
            None => {
                ctx.memo().evict(self.side, kind, id);
                Ok(None)
            }
        }
    }

    /// List everything visible on this side, memoizing each record
    pub async fn read_all(&self, ctx: &ApplyContext) -> Result<Vec<Record>> {
        let kind = self.descriptor.kind;
        tracing::debug!(kind, side = %self.side, "crud read all");
        let records = self.exec.read(ctx, None).await?;
        for record in &records {
            let id = self.descriptor.entity_id(record);
            ctx.memo().store(self.side, kind, id, record.clone());
        }
        Ok(records)
    }

    pub async fn update(&self, records: Vec<Record>, ctx: &ApplyContext) -> Result<Vec<Record>> {
        let kind = self.descriptor.kind;
        tracing::debug!(kind, side = %self.side, count = records.len(), "crud update");
        let updated = self.exec.update(records, ctx).await?;
        for record in &updated {
            let id = self.descriptor.entity_id(record);
            ctx.memo().store(self.side, kind, id, record.clone());
        }
        Ok(updated)
    }

    /// Delete records, evicting them from the memo. Ids are captured before
    /// the executor runs because executors may clear the fields an id
    /// derives from.
    pub async fn delete(&self, records: Vec<Record>, ctx: &ApplyContext) -> Result<()> {
        let kind = self.descriptor.kind;
        tracing::debug!(kind, side = %self.side, count = records.len(), "crud delete");
        let ids: Vec<EntityId> = records.iter().map(|r| self.descriptor.entity_id(r)).collect();
        self.exec.delete(records, ctx).await?;
        for id in &ids {
            ctx.memo().evict(self.side, kind, id);
        }
        Ok(())
    }

    pub fn update_or_replace(&self, old: &Record, new: &Record) -> UpdateOrReplace {
        self.exec.update_or_replace(old, new)
    }
}

/// Store-side executor derived from the entity descriptor. Translates an
/// entity id into a field filter the store can evaluate, falling back to the
/// surrogate key for ids that predate cloud identity.
pub struct StoreCrud {
    descriptor: EntityDescriptor,
}

impl StoreCrud {
    pub fn new(descriptor: EntityDescriptor) -> Self {
        Self { descriptor }
    }

    fn filter_for(&self, id: &EntityId) -> Option<RecordFilter> {
        if let Ok(fields) = self.descriptor.id_fields_of(id) {
            return Some(RecordFilter::Fields(fields));
        }
        id.as_str().parse::<u64>().ok().map(RecordFilter::Key)
    }
}

#[async_trait]
impl CrudExecutor for StoreCrud {
    async fn create(&self, records: Vec<Record>, ctx: &ApplyContext) -> Result<Vec<Record>> {
        ctx.store().insert(self.descriptor.kind, records).await
    }

    async fn read(&self, ctx: &ApplyContext, id: Option<&EntityId>) -> Result<Vec<Record>> {
        match id {
            None => ctx.store().read(self.descriptor.kind, None).await,
            Some(id) => match self.filter_for(id) {
                Some(filter) => ctx.store().read(self.descriptor.kind, Some(&filter)).await,
                None => Ok(Vec::new()),
            },
        }
    }

    async fn update(&self, records: Vec<Record>, ctx: &ApplyContext) -> Result<Vec<Record>> {
        ctx.store().update(self.descriptor.kind, records).await
    }

    async fn delete(&self, records: Vec<Record>, ctx: &ApplyContext) -> Result<()> {
        ctx.store().delete(self.descriptor.kind, records).await
    }
}
