//! Simulated inventory: an in-process stand-in for vCenter.
//!
//! Behaves like a real endpoint (sessions, views, fire-and-forget tasks)
//! and counts every lifecycle event, so callers can assert that sessions
//! are closed and views released on every path. Faults and latency can be
//! injected per operation.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use vcassist_core::error::InventoryError;
use vcassist_core::inventory::*;

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    OpenSession,
    ListEntities,
    ReadEntries,
    Mutation,
    CloseSession,
}

/// Lifecycle counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub views_opened: usize,
    pub views_released: usize,
    pub mutating_calls: usize,
}

/// One accepted mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub operation: String,
    pub vm_id: String,
    pub task_id: String,
}

#[derive(Default)]
struct Counters {
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    views_opened: AtomicUsize,
    views_released: AtomicUsize,
    mutating_calls: AtomicUsize,
}

#[derive(Default)]
struct Faults {
    open_session: AtomicBool,
    list_entities: AtomicBool,
    read_entries: AtomicBool,
    mutation: AtomicBool,
    close_session: AtomicBool,
}

impl Faults {
    fn flag(&self, fault: Fault) -> &AtomicBool {
        match fault {
            Fault::OpenSession => &self.open_session,
            Fault::ListEntities => &self.list_entities,
            Fault::ReadEntries => &self.read_entries,
            Fault::Mutation => &self.mutation,
            Fault::CloseSession => &self.close_session,
        }
    }

    fn check(&self, fault: Fault, operation: &str) -> Result<(), InventoryError> {
        if self.flag(fault).load(Ordering::SeqCst) {
            Err(InventoryError::remote(operation, "injected fault"))
        } else {
            Ok(())
        }
    }
}

struct State {
    entities: RwLock<Vec<ManagedEntity>>,
    alarms: RwLock<Vec<TriggeredAlarm>>,
    mutations: RwLock<Vec<MutationRecord>>,
    counters: Counters,
    faults: Faults,
    latency_ms: AtomicU64,
    next_task: AtomicU64,
}

impl State {
    async fn delay(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

/// In-process inventory. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SimulatedInventory {
    state: Arc<State>,
}

impl SimulatedInventory {
    pub fn new(entities: Vec<ManagedEntity>, alarms: Vec<TriggeredAlarm>) -> Self {
        Self {
            state: Arc::new(State {
                entities: RwLock::new(entities),
                alarms: RwLock::new(alarms),
                mutations: RwLock::new(Vec::new()),
                counters: Counters::default(),
                faults: Faults::default(),
                latency_ms: AtomicU64::new(0),
                next_task: AtomicU64::new(1),
            }),
        }
    }

    /// A simulated lab with a few VMs, hosts, datastores, and networks.
    pub fn lab() -> Self {
        let (entities, alarms) = crate::fixtures::lab();
        Self::new(entities, alarms)
    }

    pub fn inject_fault(&self, fault: Fault) {
        self.state.faults.flag(fault).store(true, Ordering::SeqCst);
    }

    pub fn clear_fault(&self, fault: Fault) {
        self.state.faults.flag(fault).store(false, Ordering::SeqCst);
    }

    /// Delay every remote call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn stats(&self) -> SessionStats {
        let c = &self.state.counters;
        SessionStats {
            sessions_opened: c.sessions_opened.load(Ordering::SeqCst),
            sessions_closed: c.sessions_closed.load(Ordering::SeqCst),
            views_opened: c.views_opened.load(Ordering::SeqCst),
            views_released: c.views_released.load(Ordering::SeqCst),
            mutating_calls: c.mutating_calls.load(Ordering::SeqCst),
        }
    }

    pub async fn mutations(&self) -> Vec<MutationRecord> {
        self.state.mutations.read().await.clone()
    }

    /// Current power state of a VM, by id.
    pub async fn power_state(&self, vm_id: &str) -> Option<PowerState> {
        self.state.entities.read().await.iter().find_map(|e| match e {
            ManagedEntity::VirtualMachine(vm) if vm.id == vm_id => Some(vm.power_state),
            _ => None,
        })
    }
}

#[async_trait]
impl InventoryConnector for SimulatedInventory {
    fn endpoint(&self) -> &str {
        "simulated"
    }

    async fn open_session(&self) -> Result<Box<dyn InventorySession>, InventoryError> {
        self.state.delay().await;
        if self.state.faults.flag(Fault::OpenSession).load(Ordering::SeqCst) {
            return Err(InventoryError::SessionOpen {
                endpoint: "simulated".into(),
                reason: "injected fault".into(),
            });
        }
        self.state.counters.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedSession {
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct SimulatedSession {
    state: Arc<State>,
    closed: AtomicBool,
}

impl SimulatedSession {
    fn ensure_open(&self, operation: &str) -> Result<(), InventoryError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(InventoryError::remote(operation, "session already closed"))
        } else {
            Ok(())
        }
    }

    async fn mutate(
        &self,
        operation: &str,
        vm_id: &str,
        apply: impl FnOnce(&mut VmRecord),
    ) -> Result<TaskHandle, InventoryError> {
        self.ensure_open(operation)?;
        self.state.delay().await;
        self.state.faults.check(Fault::Mutation, operation)?;

        let mut entities = self.state.entities.write().await;
        let vm = entities
            .iter_mut()
            .find_map(|e| match e {
                ManagedEntity::VirtualMachine(vm) if vm.id == vm_id => Some(vm),
                _ => None,
            })
            .ok_or_else(|| InventoryError::remote(operation, format!("no VM with id {vm_id}")))?;
        apply(vm);
        drop(entities);

        self.state.counters.mutating_calls.fetch_add(1, Ordering::SeqCst);
        let task_id = format!("task-{}", self.state.next_task.fetch_add(1, Ordering::SeqCst));
        self.state.mutations.write().await.push(MutationRecord {
            operation: operation.to_string(),
            vm_id: vm_id.to_string(),
            task_id: task_id.clone(),
        });
        debug!(operation, vm_id, task_id = %task_id, "Simulated task queued");
        Ok(TaskHandle::new(task_id))
    }
}

#[async_trait]
impl InventorySession for SimulatedSession {
    async fn list_entities(&self, kind: EntityKind) -> Result<Box<dyn EntityView>, InventoryError> {
        self.ensure_open("create view")?;
        self.state.delay().await;
        self.state.faults.check(Fault::ListEntities, "create view")?;
        self.state.counters.views_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedView {
            state: self.state.clone(),
            kind,
        }))
    }

    async fn triggered_alarms(&self) -> Result<Vec<TriggeredAlarm>, InventoryError> {
        self.ensure_open("triggered alarms")?;
        self.state.delay().await;
        self.state.faults.check(Fault::ReadEntries, "triggered alarms")?;
        Ok(self.state.alarms.read().await.clone())
    }

    async fn power_on(&self, vm_id: &str) -> Result<TaskHandle, InventoryError> {
        self.mutate("power on", vm_id, |vm| vm.power_state = PowerState::PoweredOn)
            .await
    }

    async fn power_off(&self, vm_id: &str) -> Result<TaskHandle, InventoryError> {
        self.mutate("power off", vm_id, |vm| vm.power_state = PowerState::PoweredOff)
            .await
    }

    async fn reset(&self, vm_id: &str) -> Result<TaskHandle, InventoryError> {
        self.mutate("reset", vm_id, |_| {}).await
    }

    async fn create_snapshot(&self, vm_id: &str, spec: SnapshotSpec) -> Result<TaskHandle, InventoryError> {
        self.mutate("create snapshot", vm_id, move |vm| {
            let mut node = SnapshotNode::leaf(spec.name, chrono::Utc::now());
            node.description = spec.description;
            vm.snapshots.get_or_insert_with(Vec::new).push(node);
        })
        .await
    }

    async fn close(&self) -> Result<(), InventoryError> {
        // Counted even when failing, so double closes show up in stats
        self.state.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.state.delay().await;
        self.state.faults.check(Fault::CloseSession, "close session")
    }
}

struct SimulatedView {
    state: Arc<State>,
    kind: EntityKind,
}

#[async_trait]
impl EntityView for SimulatedView {
    async fn entries(&self) -> Result<Vec<ManagedEntity>, InventoryError> {
        self.state.delay().await;
        self.state.faults.check(Fault::ReadEntries, "read view")?;
        Ok(self
            .state
            .entities
            .read()
            .await
            .iter()
            .filter(|e| e.kind() == self.kind)
            .cloned()
            .collect())
    }

    async fn release(&self) -> Result<(), InventoryError> {
        self.state.counters.views_released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
