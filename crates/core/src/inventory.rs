//! Managed inventory contract: the session-oriented interface to the
//! virtualization platform the assistant operates on.
//!
//! A caller opens a [`InventorySession`], lists an entity collection through
//! an [`EntityView`], reads the entries, releases the view and closes the
//! session. Nothing here is cached: every record is a snapshot of live
//! state taken at call time.
//!
//! Mutations return a [`TaskHandle`] as soon as the platform accepts them.
//! Completion is never awaited, and some platforms accept a task without
//! naming it.
//!
//! Connectors fill only what their platform reports. Snapshot trees, host
//! hardware and network accessibility are `None` when the connector has no
//! way to read them; capabilities a platform lacks altogether fail with
//! [`InventoryError::Unsupported`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::InventoryError;

/// Entity collections that can be listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    VirtualMachine,
    Host,
    Datastore,
    Network,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VirtualMachine => "virtual_machine",
            Self::Host => "host",
            Self::Datastore => "datastore",
            Self::Network => "network",
        }
    }

    /// Label used in operator-facing messages ("VM 'x' not found").
    pub fn label(&self) -> &'static str {
        match self {
            Self::VirtualMachine => "VM",
            Self::Host => "Host",
            Self::Datastore => "Datastore",
            Self::Network => "Network",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power state as the platform reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::PoweredOn => "poweredOn",
            Self::PoweredOff => "poweredOff",
            Self::Suspended => "suspended",
        })
    }
}

/// One node of a VM's snapshot tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

impl SnapshotNode {
    pub fn leaf(name: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            created,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<SnapshotNode>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRecord {
    /// Platform-internal identifier used for mutations
    pub id: String,
    pub name: String,
    pub power_state: PowerState,
    #[serde(default)]
    pub num_cpu: u32,
    #[serde(default)]
    pub memory_mb: u64,
    #[serde(default)]
    pub guest_os: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub hostname: String,
    /// Name of the host the VM runs on
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub tools_status: String,
    #[serde(default)]
    pub annotation: String,
    #[serde(default)]
    pub num_disks: u32,
    /// Root snapshots; each may have children. `None` when the connector
    /// cannot read snapshot trees.
    #[serde(default)]
    pub snapshots: Option<Vec<SnapshotNode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: String,
    pub name: String,
    pub connection_state: String,
    pub power_state: String,
    #[serde(default)]
    pub hardware: Option<HostHardware>,
}

/// Hardware summary and live usage of a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostHardware {
    #[serde(default)]
    pub cpu_cores: u32,
    /// Per-core clock in Hz
    #[serde(default)]
    pub cpu_hz: u64,
    #[serde(default)]
    pub memory_bytes: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub cpu_usage_mhz: u64,
    #[serde(default)]
    pub memory_usage_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreRecord {
    pub id: String,
    pub name: String,
    /// Filesystem type (VMFS, NFS, vsan...)
    #[serde(rename = "type")]
    pub kind: String,
    pub capacity_bytes: u64,
    pub free_bytes: u64,
    pub accessible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub accessible: Option<bool>,
}

/// A live record read from an entity view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManagedEntity {
    VirtualMachine(VmRecord),
    Host(HostRecord),
    Datastore(DatastoreRecord),
    Network(NetworkRecord),
}

impl ManagedEntity {
    pub fn name(&self) -> &str {
        match self {
            Self::VirtualMachine(vm) => &vm.name,
            Self::Host(host) => &host.name,
            Self::Datastore(ds) => &ds.name,
            Self::Network(net) => &net.name,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::VirtualMachine(_) => EntityKind::VirtualMachine,
            Self::Host(_) => EntityKind::Host,
            Self::Datastore(_) => EntityKind::Datastore,
            Self::Network(_) => EntityKind::Network,
        }
    }
}

/// An alarm currently triggered somewhere in the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredAlarm {
    pub entity: String,
    pub alarm: String,
    pub status: String,
    pub acknowledged: bool,
}

/// Handle of a remote task accepted by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    /// `None` when the platform accepted the task without an id
    #[serde(default)]
    pub task_id: Option<String>,
}

impl TaskHandle {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
        }
    }

    /// A task the platform accepted without naming it.
    pub fn untracked() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub memory: bool,
    #[serde(default)]
    pub quiesce: bool,
}

/// Opens sessions to the managed system.
///
/// Implementations hold configuration only; they never keep a session alive
/// between calls.
#[async_trait]
pub trait InventoryConnector: Send + Sync {
    /// Endpoint description for logs and error messages.
    fn endpoint(&self) -> &str;

    /// Authenticate and open a fresh session.
    async fn open_session(&self) -> std::result::Result<Box<dyn InventorySession>, InventoryError>;
}

/// One authenticated session. Must be closed by whoever opened it.
#[async_trait]
pub trait InventorySession: Send + Sync {
    /// Open an enumeration view over every entity of `kind`.
    async fn list_entities(&self, kind: EntityKind) -> std::result::Result<Box<dyn EntityView>, InventoryError>;

    async fn triggered_alarms(&self) -> std::result::Result<Vec<TriggeredAlarm>, InventoryError>;

    async fn power_on(&self, vm_id: &str) -> std::result::Result<TaskHandle, InventoryError>;

    async fn power_off(&self, vm_id: &str) -> std::result::Result<TaskHandle, InventoryError>;

    async fn reset(&self, vm_id: &str) -> std::result::Result<TaskHandle, InventoryError>;

    async fn create_snapshot(
        &self,
        vm_id: &str,
        spec: SnapshotSpec,
    ) -> std::result::Result<TaskHandle, InventoryError>;

    /// Log out. The session must not be used afterwards.
    async fn close(&self) -> std::result::Result<(), InventoryError>;
}

/// A server-side enumeration handle. Must be released after reading.
#[async_trait]
pub trait EntityView: Send + Sync {
    async fn entries(&self) -> std::result::Result<Vec<ManagedEntity>, InventoryError>;

    async fn release(&self) -> std::result::Result<(), InventoryError>;
}
