//! Reconciliation engine
//!
//! One pass visits modules in dependency order and, for each mapper,
//! observes both sides, partitions by entity id and resolves every mismatch:
//! create, update, replace, restore, adopt or delete. Record-level failures
//! are collected without aborting siblings; a mapper-level failure marks its
//! module failed and skips dependents only. Re-running the pass is the
//! recovery mechanism for anything left unconverged.

use crate::client::{ClientCache, ClientProvider};
use crate::context::{ApplyContext, MapperRuntime};
use crate::crud::UpdateOrReplace;
use crate::diff::{Diff, partition};
use crate::error::{EngineError, Result};
use crate::mapper::ReplaceOrder;
use crate::memo::Side;
use crate::module::ModuleRegistry;
use crate::store::Store;
use converge_core::{ApplyReport, ChangeKind, Direction, EntityId, Plan, PlannedChange, Record};
use futures_util::future::try_join;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Options for one plan or apply invocation
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Restrict the pass to these modules (plus transitive dependencies);
    /// `None` reconciles everything registered
    pub modules: Option<Vec<String>>,

    /// How one-sided records are resolved
    pub direction: Direction,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            modules: None,
            direction: Direction::Provision,
        }
    }
}

impl ApplyOptions {
    pub fn provision() -> Self {
        Self::default()
    }

    pub fn import() -> Self {
        Self {
            modules: None,
            direction: Direction::Import,
        }
    }

    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules = Some(modules.into_iter().map(Into::into).collect());
        self
    }
}

/// The reconciliation engine: a module registry bound to a store and a
/// cloud client provider
pub struct Engine {
    registry: ModuleRegistry,
    store: Arc<dyn Store>,
    clients: Arc<dyn ClientProvider>,
}

impl Engine {
    pub fn new(
        registry: ModuleRegistry,
        store: Arc<dyn Store>,
        clients: Arc<dyn ClientProvider>,
    ) -> Self {
        Self {
            registry,
            store,
            clients,
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Fresh per-pass context over every registered mapper, so cross-module
    /// relations resolve even when the pass targets a module subset
    fn context(&self) -> ApplyContext {
        ApplyContext::new(
            self.store.clone(),
            ClientCache::new(self.clients.clone()),
            self.registry.mappers().cloned(),
        )
    }

    /// Dry run: classify every mismatch the way an apply would resolve it,
    /// without issuing any mutation
    pub async fn plan(&self, options: &ApplyOptions) -> Result<Plan> {
        let order = self.registry.order(options.modules.as_deref())?;
        let ctx = self.context();
        let mut changes = Vec::new();
        for module in order {
            for mapper in module.mappers() {
                let runtime = ctx.runtime(mapper.descriptor().kind)?;
                let diff = self.observe(runtime, &ctx).await?;
                changes.extend(self.classify(runtime, options.direction, &diff));
            }
        }
        Ok(Plan::new(changes))
    }

    /// Run one reconciliation pass
    pub async fn apply(&self, options: &ApplyOptions) -> Result<ApplyReport> {
        let started = Instant::now();
        let order = self.registry.order(options.modules.as_deref())?;
        let ctx = self.context();
        let mut report = ApplyReport::new();
        let mut failed: HashSet<String> = HashSet::new();

        for module in order {
            if let Some(dep) = module.dependencies().iter().find(|d| failed.contains(*d)) {
                tracing::warn!(
                    module = module.name(),
                    dependency = dep.as_str(),
                    "skipping module, dependency failed"
                );
                failed.insert(module.name().to_string());
                report.skipped_modules.push(module.name().to_string());
                continue;
            }
            tracing::info!(module = module.name(), "reconciling module");
            for mapper in module.mappers() {
                let kind = mapper.descriptor().kind;
                let runtime = ctx.runtime(kind)?;
                if let Err(err) = self
                    .reconcile(runtime, options.direction, &ctx, &mut report)
                    .await
                {
                    tracing::warn!(
                        module = module.name(),
                        kind,
                        error = %err,
                        "mapper failed, marking module failed"
                    );
                    if report.fatal.is_none() {
                        report.fatal = Some(format!("{kind}: {err}"));
                    }
                    failed.insert(module.name().to_string());
                    break;
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            changes = report.total_changes(),
            failures = report.failures.len(),
            duration_ms = report.duration_ms,
            "pass complete"
        );
        Ok(report)
    }

    /// Observe both sides of one mapper concurrently and partition the
    /// memoized snapshots
    async fn observe(&self, runtime: &MapperRuntime, ctx: &ApplyContext) -> Result<Diff> {
        try_join(runtime.db.read_all(ctx), runtime.cloud.read_all(ctx)).await?;
        let desired = ctx.memo().snapshot(Side::Db, runtime.kind());
        let actual = ctx.memo().snapshot(Side::Cloud, runtime.kind());
        Ok(partition(desired, actual, |a, b| runtime.mapper().equals(a, b)))
    }

    async fn reconcile(
        &self,
        runtime: &MapperRuntime,
        direction: Direction,
        ctx: &ApplyContext,
        report: &mut ApplyReport,
    ) -> Result<()> {
        let kind = runtime.kind();
        let diff = self.observe(runtime, ctx).await?;
        for _ in &diff.unchanged {
            report.record(kind, ChangeKind::NoOp);
        }
        match direction {
            Direction::Provision => self.provision(runtime, diff, ctx, report).await,
            Direction::Import => self.import(runtime, diff, ctx, report).await,
        }
        Ok(())
    }

    /// Resolve drift toward the store's desired state
    async fn provision(
        &self,
        runtime: &MapperRuntime,
        diff: Diff,
        ctx: &ApplyContext,
        report: &mut ApplyReport,
    ) {
        let kind = runtime.kind();

        for (id, desired) in diff.desired_only {
            match self.create_record(runtime, &desired, ctx).await {
                Ok(()) => report.record(kind, ChangeKind::Create),
                Err(err) => {
                    tracing::warn!(kind, %id, error = %err, "create failed");
                    report.record_failure(kind, id.as_str(), ChangeKind::Create, err);
                }
            }
        }

        for (id, desired, actual) in diff.changed {
            let action = self.classify_pair(runtime, Direction::Provision, &desired, &actual);
            let outcome = match action {
                ChangeKind::Restore => self.restore(runtime, &desired, &actual, ctx).await,
                ChangeKind::Update => self.update_in_place(runtime, &desired, ctx).await,
                ChangeKind::Replace => self.replace(runtime, &desired, &actual, ctx).await,
                // classify_pair only yields the three above for changed pairs
                _ => Ok(()),
            };
            match outcome {
                Ok(()) => report.record(kind, action),
                Err(err) => {
                    tracing::warn!(kind, %id, %action, error = %err, "resolution failed");
                    report.record_failure(kind, id.as_str(), action, err);
                }
            }
        }

        for (id, actual) in diff.actual_only {
            if runtime.mapper().protected(&actual) {
                // Protected resources refuse deletion; bring the row back
                match runtime.db.create(vec![actual.clone()], ctx).await {
                    Ok(_) => report.record(kind, ChangeKind::Restore),
                    Err(err) => {
                        report.record_failure(kind, id.as_str(), ChangeKind::Restore, err);
                    }
                }
                continue;
            }
            match runtime.cloud.delete(vec![actual], ctx).await {
                Ok(()) => report.record(kind, ChangeKind::Delete),
                Err(err) => {
                    tracing::warn!(kind, %id, error = %err, "delete failed");
                    report.record_failure(kind, id.as_str(), ChangeKind::Delete, err);
                }
            }
        }
    }

    /// Resolve drift toward the cloud's actual state
    async fn import(
        &self,
        runtime: &MapperRuntime,
        diff: Diff,
        ctx: &ApplyContext,
        report: &mut ApplyReport,
    ) {
        let kind = runtime.kind();

        for (id, desired) in diff.desired_only {
            match runtime.db.delete(vec![desired], ctx).await {
                Ok(()) => report.record(kind, ChangeKind::Delete),
                Err(err) => report.record_failure(kind, id.as_str(), ChangeKind::Delete, err),
            }
        }

        for (id, actual) in diff.actual_only {
            match runtime.db.create(vec![actual], ctx).await {
                Ok(_) => report.record(kind, ChangeKind::Adopt),
                Err(err) => report.record_failure(kind, id.as_str(), ChangeKind::Adopt, err),
            }
        }

        for (id, desired, actual) in diff.changed {
            let mut overwrite = actual.clone();
            overwrite.key = desired.key;
            match runtime.db.update(vec![overwrite], ctx).await {
                Ok(_) => report.record(kind, ChangeKind::Update),
                Err(err) => report.record_failure(kind, id.as_str(), ChangeKind::Update, err),
            }
        }
    }

    /// Classify how a changed pair would be resolved
    fn classify_pair(
        &self,
        runtime: &MapperRuntime,
        direction: Direction,
        desired: &Record,
        actual: &Record,
    ) -> ChangeKind {
        match direction {
            Direction::Import => ChangeKind::Update,
            Direction::Provision => {
                if self.restorable(runtime, desired, actual) {
                    ChangeKind::Restore
                } else {
                    match runtime.cloud.update_or_replace(actual, desired) {
                        UpdateOrReplace::Update => ChangeKind::Update,
                        UpdateOrReplace::Replace => ChangeKind::Replace,
                    }
                }
            }
        }
    }

    /// Drift that must not reach the cloud: a protected record, drift in
    /// provider-assigned fields only, or drift confined to structurally
    /// protected user fields
    fn restorable(&self, runtime: &MapperRuntime, desired: &Record, actual: &Record) -> bool {
        if runtime.mapper().protected(actual) {
            return true;
        }
        let changed = desired.changed_fields(actual);
        if changed.is_empty() {
            return true;
        }
        let protected = runtime.mapper().protected_fields();
        !protected.is_empty() && changed.iter().all(|f| protected.contains(f))
    }

    /// Classification of a whole diff, for dry runs
    fn classify(
        &self,
        runtime: &MapperRuntime,
        direction: Direction,
        diff: &Diff,
    ) -> Vec<PlannedChange> {
        let kind = runtime.kind();
        let mut changes = Vec::new();
        let planned = |id: &EntityId, action: ChangeKind| PlannedChange {
            entity: kind.to_string(),
            entity_id: id.to_string(),
            action,
        };

        for (id, _) in &diff.desired_only {
            let action = match direction {
                Direction::Provision => ChangeKind::Create,
                Direction::Import => ChangeKind::Delete,
            };
            changes.push(planned(id, action));
        }
        for (id, desired, actual) in &diff.changed {
            changes.push(planned(id, self.classify_pair(runtime, direction, desired, actual)));
        }
        for (id, actual) in &diff.actual_only {
            let action = match direction {
                Direction::Provision if runtime.mapper().protected(actual) => ChangeKind::Restore,
                Direction::Provision => ChangeKind::Delete,
                Direction::Import => ChangeKind::Adopt,
            };
            changes.push(planned(id, action));
        }
        for id in &diff.unchanged {
            changes.push(planned(id, ChangeKind::NoOp));
        }
        changes
    }

    /// Provision one desired-only record and write the populated result back
    /// to the store under the original surrogate key
    async fn create_record(
        &self,
        runtime: &MapperRuntime,
        desired: &Record,
        ctx: &ApplyContext,
    ) -> Result<()> {
        let created = runtime.cloud.create(vec![desired.clone()], ctx).await?;
        for mut record in created {
            record.key = desired.key;
            runtime.db.update(vec![record], ctx).await?;
        }
        Ok(())
    }

    /// In-place mutation: the only path that changes a live resource, then a
    /// re-read so provider-assigned fields propagate to the store
    async fn update_in_place(
        &self,
        runtime: &MapperRuntime,
        desired: &Record,
        ctx: &ApplyContext,
    ) -> Result<()> {
        runtime.cloud.update(vec![desired.clone()], ctx).await?;
        let id = runtime.mapper().entity_id(desired);
        let refreshed = runtime
            .cloud
            .read(ctx, &id)
            .await?
            .ok_or_else(|| {
                EngineError::Provider(format!(
                    "{} {id} not readable after update",
                    runtime.kind()
                ))
            })?;
        let mut write_back = refreshed;
        write_back.key = desired.key;
        runtime.db.update(vec![write_back], ctx).await?;
        Ok(())
    }

    /// Two-phase replace. The new resource takes over the old record's
    /// surrogate key so references to the row survive the identity change.
    async fn replace(
        &self,
        runtime: &MapperRuntime,
        desired: &Record,
        actual: &Record,
        ctx: &ApplyContext,
    ) -> Result<()> {
        let created = match runtime.mapper().replace_order() {
            ReplaceOrder::CreateThenDelete => {
                let created = runtime.cloud.create(vec![desired.clone()], ctx).await?;
                runtime.cloud.delete(vec![actual.clone()], ctx).await?;
                created
            }
            ReplaceOrder::DeleteThenCreate => {
                runtime.cloud.delete(vec![actual.clone()], ctx).await?;
                runtime.cloud.create(vec![desired.clone()], ctx).await?
            }
        };
        for mut record in created {
            record.key = desired.key;
            runtime.db.update(vec![record], ctx).await?;
        }
        Ok(())
    }

    /// Overwrite the store's copy with the cloud's; never touches the cloud
    async fn restore(
        &self,
        runtime: &MapperRuntime,
        desired: &Record,
        actual: &Record,
        ctx: &ApplyContext,
    ) -> Result<()> {
        let mut restored = actual.clone();
        restored.key = desired.key;
        runtime.db.update(vec![restored], ctx).await?;
        Ok(())
    }
}
