//! Entity mapper contract
//!
//! One [`EntityMapper`] per resource type. The mapper supplies the entity
//! shape, the drift predicate and the cloud-side executor; everything else
//! has a default. Mapper CRUD implementations may recursively invoke other
//! mappers through [`ApplyContext::resolve`](crate::context::ApplyContext::resolve)
//! to satisfy relations.

use crate::crud::{CrudExecutor, StoreCrud};
use converge_core::{EntityDescriptor, EntityId, IdFields, Record};
use std::sync::Arc;

/// Ordering of the two halves of a replace. Create-then-delete is the safe
/// default; a mapper whose resource holds a scarce external allocation (a
/// single reusable address, a unique name) flips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOrder {
    CreateThenDelete,
    DeleteThenCreate,
}

/// Per-resource-type adapter contract
pub trait EntityMapper: Send + Sync {
    /// Entity kind and identity field layout
    fn descriptor(&self) -> &EntityDescriptor;

    /// Drift predicate over fields meaningful for reconciliation. Must be
    /// reflexive and symmetric and must ignore store-only bookkeeping. The
    /// default compares the full user field maps.
    fn equals(&self, a: &Record, b: &Record) -> bool {
        a.fields == b.fields
    }

    /// Store-side executor; the descriptor-derived one fits most mappers
    fn db(&self) -> Arc<dyn CrudExecutor> {
        Arc::new(StoreCrud::new(self.descriptor().clone()))
    }

    /// Cloud-side executor
    fn cloud(&self) -> Arc<dyn CrudExecutor>;

    /// Protected resources (a default network, a provider-managed role)
    /// refuse deletion and in-place edits; any drift is resolved by
    /// restoring the store's copy from the cloud.
    fn protected(&self, _record: &Record) -> bool {
        false
    }

    /// User-settable fields that are structurally protected: drift confined
    /// to these resolves through the restore path instead of a cloud call.
    fn protected_fields(&self) -> &[&str] {
        &[]
    }

    /// How a replace sequences its create and delete halves
    fn replace_order(&self) -> ReplaceOrder {
        ReplaceOrder::CreateThenDelete
    }

    /// Derive the composite entity id of a record
    fn entity_id(&self, record: &Record) -> EntityId {
        self.descriptor().entity_id(record)
    }

    /// Build an entity id from named identity field values
    fn generate_id(&self, fields: &IdFields) -> converge_core::Result<EntityId> {
        self.descriptor().generate_id(fields)
    }

    /// Split an entity id back into named identity field values
    fn id_fields(&self, id: &EntityId) -> converge_core::Result<IdFields> {
        self.descriptor().id_fields_of(id)
    }
}
