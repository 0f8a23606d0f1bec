//! Shared fixtures: an in-memory fake cloud with a mutation log, plus
//! network / gateway / zone mappers wired into an engine over a MemStore.

#![allow(dead_code)]

use async_trait::async_trait;
use converge_engine::{
    ApplyContext, ClientHandle, ClientProvider, CrudExecutor, Engine, EngineError, EntityDescriptor,
    EntityId, EntityMapper, Module, ModuleRegistry, Record, Result, UpdateOrReplace,
};
use converge_memstore::MemStore;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const NETWORK: EntityDescriptor = EntityDescriptor::new("network", &["network_id", "region"]);
pub const GATEWAY: EntityDescriptor = EntityDescriptor::new("gateway", &["gateway_id"]);
pub const ZONE: EntityDescriptor = EntityDescriptor::new("zone", &["zone_name"]);

/// Cloud control-plane stand-in. Keeps resources per kind keyed by entity
/// id and logs every mutating call in order.
#[derive(Default)]
pub struct FakeCloud {
    resources: Mutex<HashMap<&'static str, BTreeMap<String, Record>>>,
    next_id: AtomicU64,
    calls: Mutex<Vec<String>>,
    broken: Mutex<HashSet<&'static str>>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Place a resource directly, bypassing the mutation log
    pub fn seed(&self, descriptor: &EntityDescriptor, record: Record) {
        let id = descriptor.entity_id(&record).to_string();
        self.resources
            .lock()
            .unwrap()
            .entry(descriptor.kind)
            .or_default()
            .insert(id, record);
    }

    /// Make every read of this kind fail
    pub fn break_kind(&self, kind: &'static str) {
        self.broken.lock().unwrap().insert(kind);
    }

    pub fn check(&self, kind: &'static str) -> Result<()> {
        if self.broken.lock().unwrap().contains(kind) {
            return Err(EngineError::Provider(format!("{kind} api unavailable")));
        }
        Ok(())
    }

    pub fn log(&self, verb: &str, kind: &str, id: &str) {
        self.calls.lock().unwrap().push(format!("{verb} {kind} {id}"));
    }

    /// Mutating calls in issue order
    pub fn mutations(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn get(&self, kind: &'static str, id: &str) -> Option<Record> {
        self.resources
            .lock()
            .unwrap()
            .get(kind)
            .and_then(|m| m.get(id))
            .cloned()
    }

    pub fn count(&self, kind: &'static str) -> usize {
        self.resources
            .lock()
            .unwrap()
            .get(kind)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn insert(&self, kind: &'static str, id: String, record: Record) {
        self.resources
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .insert(id, record);
    }

    fn remove(&self, kind: &'static str, id: &str) {
        if let Some(table) = self.resources.lock().unwrap().get_mut(kind) {
            table.remove(id);
        }
    }

    fn list(&self, kind: &'static str, id: Option<&EntityId>) -> Vec<Record> {
        let resources = self.resources.lock().unwrap();
        let Some(table) = resources.get(kind) else {
            return Vec::new();
        };
        match id {
            Some(id) => table.get(id.as_str()).cloned().into_iter().collect(),
            None => table.values().cloned().collect(),
        }
    }
}

/// Networks get a provider-assigned `network_id` at create time; a cidr
/// change forces destroy-and-recreate.
pub struct NetworkCloud {
    pub cloud: Arc<FakeCloud>,
}

#[async_trait]
impl CrudExecutor for NetworkCloud {
    async fn create(&self, records: Vec<Record>, _ctx: &ApplyContext) -> Result<Vec<Record>> {
        let mut created = Vec::with_capacity(records.len());
        for mut record in records {
            record.set_assigned("network_id", format!("net-{}", self.cloud.next_id()));
            record.set_assigned("state", "available");
            let id = NETWORK.entity_id(&record).to_string();
            self.cloud.log("create", "network", &id);
            self.cloud.insert("network", id, record.clone());
            created.push(record);
        }
        Ok(created)
    }

    async fn read(&self, _ctx: &ApplyContext, id: Option<&EntityId>) -> Result<Vec<Record>> {
        self.cloud.check("network")?;
        Ok(self.cloud.list("network", id))
    }

    async fn update(&self, records: Vec<Record>, _ctx: &ApplyContext) -> Result<Vec<Record>> {
        let mut updated = Vec::with_capacity(records.len());
        for record in records {
            let id = NETWORK.entity_id(&record).to_string();
            self.cloud.log("update", "network", &id);
            self.cloud.insert("network", id, record.clone());
            updated.push(record);
        }
        Ok(updated)
    }

    async fn delete(&self, records: Vec<Record>, _ctx: &ApplyContext) -> Result<()> {
        for record in records {
            let id = NETWORK.entity_id(&record).to_string();
            self.cloud.log("delete", "network", &id);
            self.cloud.remove("network", &id);
        }
        Ok(())
    }

    fn update_or_replace(&self, old: &Record, new: &Record) -> UpdateOrReplace {
        if new.changed_fields(old).contains(&"cidr") {
            UpdateOrReplace::Replace
        } else {
            UpdateOrReplace::Update
        }
    }
}

pub struct NetworkMapper {
    pub cloud: Arc<FakeCloud>,
}

impl EntityMapper for NetworkMapper {
    fn descriptor(&self) -> &EntityDescriptor {
        &NETWORK
    }

    fn cloud(&self) -> Arc<dyn CrudExecutor> {
        Arc::new(NetworkCloud {
            cloud: self.cloud.clone(),
        })
    }

    fn protected(&self, record: &Record) -> bool {
        record.field_as::<bool>("is_default") == Some(true)
    }

    fn protected_fields(&self) -> &[&str] {
        &["dns_support"]
    }
}

/// Gateways attach to the network serving their region. The network must
/// already exist; creation resolves it through the shared context.
pub struct GatewayCloud {
    pub cloud: Arc<FakeCloud>,
}

#[async_trait]
impl CrudExecutor for GatewayCloud {
    async fn create(&self, records: Vec<Record>, ctx: &ApplyContext) -> Result<Vec<Record>> {
        let mut created = Vec::with_capacity(records.len());
        for mut record in records {
            let region: String = record.field_as("region").unwrap_or_default();
            let networks = ctx.runtime("network")?.db.read_all(ctx).await?;
            let network = networks
                .iter()
                .find(|n| n.field_as::<String>("region").as_deref() == Some(&region))
                .ok_or_else(|| EngineError::DependencyNotReady {
                    kind: "network".to_string(),
                    id: region.clone(),
                })?;
            let resolved = ctx
                .resolve_required("network", &NETWORK.entity_id(network))
                .await?;
            let network_id: String = resolved.assigned_as("network_id").ok_or_else(|| {
                EngineError::DependencyNotReady {
                    kind: "network".to_string(),
                    id: region.clone(),
                }
            })?;

            record.set_assigned("gateway_id", format!("gw-{}", self.cloud.next_id()));
            record.set_assigned("network_id", network_id);
            let id = GATEWAY.entity_id(&record).to_string();
            self.cloud.log("create", "gateway", &id);
            self.cloud.insert("gateway", id, record.clone());
            created.push(record);
        }
        Ok(created)
    }

    async fn read(&self, _ctx: &ApplyContext, id: Option<&EntityId>) -> Result<Vec<Record>> {
        self.cloud.check("gateway")?;
        Ok(self.cloud.list("gateway", id))
    }

    async fn update(&self, records: Vec<Record>, _ctx: &ApplyContext) -> Result<Vec<Record>> {
        let mut updated = Vec::with_capacity(records.len());
        for record in records {
            let id = GATEWAY.entity_id(&record).to_string();
            self.cloud.log("update", "gateway", &id);
            self.cloud.insert("gateway", id, record.clone());
            updated.push(record);
        }
        Ok(updated)
    }

    async fn delete(&self, records: Vec<Record>, _ctx: &ApplyContext) -> Result<()> {
        for record in records {
            let id = GATEWAY.entity_id(&record).to_string();
            self.cloud.log("delete", "gateway", &id);
            self.cloud.remove("gateway", &id);
        }
        Ok(())
    }
}

pub struct GatewayMapper {
    pub cloud: Arc<FakeCloud>,
}

impl EntityMapper for GatewayMapper {
    fn descriptor(&self) -> &EntityDescriptor {
        &GATEWAY
    }

    fn cloud(&self) -> Arc<dyn CrudExecutor> {
        Arc::new(GatewayCloud {
            cloud: self.cloud.clone(),
        })
    }
}

/// Zones use a natural key and need nothing else: the simplest mapper shape
pub struct ZoneCloud {
    pub cloud: Arc<FakeCloud>,
}

#[async_trait]
impl CrudExecutor for ZoneCloud {
    async fn create(&self, records: Vec<Record>, _ctx: &ApplyContext) -> Result<Vec<Record>> {
        let mut created = Vec::with_capacity(records.len());
        for record in records {
            let id = ZONE.entity_id(&record).to_string();
            self.cloud.log("create", "zone", &id);
            self.cloud.insert("zone", id, record.clone());
            created.push(record);
        }
        Ok(created)
    }

    async fn read(&self, _ctx: &ApplyContext, id: Option<&EntityId>) -> Result<Vec<Record>> {
        self.cloud.check("zone")?;
        Ok(self.cloud.list("zone", id))
    }

    async fn update(&self, records: Vec<Record>, _ctx: &ApplyContext) -> Result<Vec<Record>> {
        let mut updated = Vec::with_capacity(records.len());
        for record in records {
            let id = ZONE.entity_id(&record).to_string();
            self.cloud.log("update", "zone", &id);
            self.cloud.insert("zone", id, record.clone());
            updated.push(record);
        }
        Ok(updated)
    }

    async fn delete(&self, records: Vec<Record>, _ctx: &ApplyContext) -> Result<()> {
        for record in records {
            let id = ZONE.entity_id(&record).to_string();
            self.cloud.log("delete", "zone", &id);
            self.cloud.remove("zone", &id);
        }
        Ok(())
    }
}

pub struct ZoneMapper {
    pub cloud: Arc<FakeCloud>,
}

impl EntityMapper for ZoneMapper {
    fn descriptor(&self) -> &EntityDescriptor {
        &ZONE
    }

    fn cloud(&self) -> Arc<dyn CrudExecutor> {
        Arc::new(ZoneCloud {
            cloud: self.cloud.clone(),
        })
    }
}

pub struct NullProvider;

#[async_trait]
impl ClientProvider for NullProvider {
    async fn connect(&self, _service: &str, _region: &str) -> Result<ClientHandle> {
        Ok(Arc::new(()))
    }
}

pub struct Fixture {
    pub store: Arc<MemStore>,
    pub cloud: Arc<FakeCloud>,
    pub engine: Engine,
}

/// Three modules: networking, gateways (depends on networking) and an
/// independent dns module
pub fn fixture() -> Fixture {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemStore::new());

    let mut registry = ModuleRegistry::new();
    registry
        .register(Module::new("networking").with_mapper(Arc::new(NetworkMapper {
            cloud: cloud.clone(),
        })))
        .unwrap();
    registry
        .register(
            Module::new("gateways")
                .with_dependency("networking")
                .with_mapper(Arc::new(GatewayMapper {
                    cloud: cloud.clone(),
                })),
        )
        .unwrap();
    registry
        .register(Module::new("dns").with_mapper(Arc::new(ZoneMapper {
            cloud: cloud.clone(),
        })))
        .unwrap();

    let engine = Engine::new(registry, store.clone(), Arc::new(NullProvider));
    Fixture {
        store,
        cloud,
        engine,
    }
}

pub fn network_record(region: &str, cidr: &str) -> Record {
    Record::new()
        .with_field("region", region)
        .with_field("cidr", cidr)
        .with_field("dns_support", true)
        .with_field("tag", "dev")
}

pub fn gateway_record(name: &str, region: &str) -> Record {
    Record::new()
        .with_field("name", name)
        .with_field("region", region)
}

pub fn zone_record(name: &str) -> Record {
    Record::new().with_field("zone_name", name)
}
