//! Converge reconciliation engine
//!
//! One generic engine reconciles a relational store (desired state) against a
//! cloud provider's control plane (actual state). Per-resource adapters plug
//! in through the [`EntityMapper`] contract; the engine decides what to
//! create, update, replace, restore, adopt or delete.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │                    caller                      │
//! │            engine.plan() / apply()             │
//! └──────────────────────┬─────────────────────────┘
//!                        │
//! ┌──────────────────────▼─────────────────────────┐
//! │                converge-engine                 │
//! │  ┌──────────────┐   ┌────────────────────────┐ │
//! │  │ ModuleRegistry│──▶│ apply loop (per mapper)│ │
//! │  │  (topo order) │   │ observe→diff→resolve   │ │
//! │  └──────────────┘   └───────────┬────────────┘ │
//! │  ┌──────────────────────────────▼────────────┐ │
//! │  │ ApplyContext: store + clients + memo cache│ │
//! │  └───────┬──────────────────────┬────────────┘ │
//! └──────────┼──────────────────────┼──────────────┘
//!            │                      │
//!    ┌───────▼───────┐      ┌───────▼───────┐
//!    │  Store (db)   │      │ cloud adapters│
//!    │ desired state │      │ actual state  │
//!    └───────────────┘      └───────────────┘
//! ```

pub mod client;
pub mod context;
pub mod crud;
pub mod diff;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod memo;
pub mod module;
pub mod store;
pub mod waiter;

// Re-exports
pub use client::{ClientCache, ClientHandle, ClientProvider};
pub use context::{ApplyContext, MapperRuntime};
pub use crud::{Crud, CrudExecutor, StoreCrud, UpdateOrReplace};
pub use diff::Diff;
pub use engine::{ApplyOptions, Engine};
pub use error::{EngineError, Result};
pub use mapper::{EntityMapper, ReplaceOrder};
pub use memo::{MemoCache, Side};
pub use module::{Module, ModuleRegistry};
pub use store::{RecordFilter, Store};
pub use waiter::{WaitConfig, WaitState, wait_until};

pub use converge_core::{
    ApplyFailure, ApplyReport, ChangeKind, Direction, EntityDescriptor, EntityId, EntityOutcome,
    EntityRef, IdFields, Plan, PlanSummary, PlannedChange, Record, RecordError,
};
