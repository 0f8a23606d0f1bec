//! Module registry and dependency graph
//!
//! A module groups the mappers for one provider area (networking, compute)
//! and declares which other modules its mappers may reference. Registration
//! requires every declared dependency to already be registered, which makes
//! dependency cycles unrepresentable. Reconciliation visits modules in a
//! topological order that is stable with respect to registration order.

use crate::error::{EngineError, Result};
use crate::mapper::EntityMapper;
use std::collections::HashSet;
use std::sync::Arc;

/// A named group of entity mappers plus its module dependencies
pub struct Module {
    name: String,
    dependencies: Vec<String>,
    mappers: Vec<Arc<dyn EntityMapper>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            mappers: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn EntityMapper>) -> Self {
        self.mappers.push(mapper);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Mappers in declaration order; intra-module ordering beyond this is
    /// encoded by mappers invoking each other directly
    pub fn mappers(&self) -> &[Arc<dyn EntityMapper>] {
        &self.mappers
    }
}

/// Registry of modules with dependency validation and topological ordering
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Module>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. Fails on duplicate names and on dependencies that
    /// are not registered yet; because a dependency must precede its
    /// dependents, the graph can never contain a cycle.
    pub fn register(&mut self, module: Module) -> Result<()> {
        if self.get(module.name()).is_some() {
            return Err(EngineError::DuplicateModule(module.name().to_string()));
        }
        for dependency in module.dependencies() {
            if dependency == module.name() || self.get(dependency).is_none() {
                return Err(EngineError::UnknownDependency {
                    module: module.name().to_string(),
                    dependency: dependency.clone(),
                });
            }
        }
        tracing::debug!(module = module.name(), "registered module");
        self.modules.push(module);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name() == name)
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// All mappers across all modules
    pub fn mappers(&self) -> impl Iterator<Item = &Arc<dyn EntityMapper>> {
        self.modules.iter().flat_map(|m| m.mappers().iter())
    }

    /// Topological order over the requested modules (all when `None`),
    /// expanded to include transitive dependencies. Stable: among ready
    /// modules, registration order wins.
    pub fn order(&self, subset: Option<&[String]>) -> Result<Vec<&Module>> {
        let selected = self.expand(subset)?;
        let mut placed: HashSet<&str> = HashSet::new();
        let mut out: Vec<&Module> = Vec::with_capacity(selected.len());
        while out.len() < selected.len() {
            let before = out.len();
            for module in &self.modules {
                if !selected.contains(module.name()) || placed.contains(module.name()) {
                    continue;
                }
                let ready = module
                    .dependencies()
                    .iter()
                    .all(|d| placed.contains(d.as_str()));
                if ready {
                    placed.insert(module.name());
                    out.push(module);
                }
            }
            if out.len() == before {
                // Unreachable through register(), kept as a structural guard
                let stuck = self
                    .modules
                    .iter()
                    .find(|m| selected.contains(m.name()) && !placed.contains(m.name()))
                    .map(|m| m.name().to_string())
                    .unwrap_or_default();
                return Err(EngineError::DependencyCycle(stuck));
            }
        }
        Ok(out)
    }

    /// Expand a module subset with its transitive dependencies
    fn expand(&self, subset: Option<&[String]>) -> Result<HashSet<String>> {
        match subset {
            None => Ok(self.modules.iter().map(|m| m.name().to_string()).collect()),
            Some(names) => {
                let mut selected: HashSet<String> = HashSet::new();
                let mut queue: Vec<String> = names.to_vec();
                while let Some(name) = queue.pop() {
                    let module = self
                        .get(&name)
                        .ok_or_else(|| EngineError::UnknownModule(name.clone()))?;
                    if selected.insert(name) {
                        queue.extend(module.dependencies().iter().cloned());
                    }
                }
                Ok(selected)
            }
        }
    }
}
