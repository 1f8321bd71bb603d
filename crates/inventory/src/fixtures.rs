//! Record builders for seeding a [`SimulatedInventory`](crate::SimulatedInventory).

use chrono::{TimeZone, Utc};
use vcassist_core::inventory::*;

pub fn vm(name: &str, power_state: PowerState) -> VmRecord {
    VmRecord {
        id: format!("vm-{}", slug(name)),
        name: name.to_string(),
        power_state,
        num_cpu: 2,
        memory_mb: 4096,
        guest_os: "Ubuntu Linux (64-bit)".into(),
        ip_address: String::new(),
        hostname: String::new(),
        host: "esxi-01.lab.local".into(),
        tools_status: "toolsOk".into(),
        annotation: String::new(),
        num_disks: 1,
        snapshots: Some(Vec::new()),
    }
}

pub fn host(name: &str) -> HostRecord {
    HostRecord {
        id: format!("host-{}", slug(name)),
        name: name.to_string(),
        connection_state: "connected".into(),
        power_state: "poweredOn".into(),
        hardware: Some(HostHardware {
            cpu_cores: 16,
            cpu_hz: 2_600_000_000,
            memory_bytes: 128 * 1024 * 1024 * 1024,
            model: "PowerEdge R650".into(),
            vendor: "Dell Inc.".into(),
            version: "8.0.2".into(),
            cpu_usage_mhz: 9_800,
            memory_usage_mb: 61_440,
        }),
    }
}

pub fn datastore(name: &str, capacity_gb: u64, free_gb: u64) -> DatastoreRecord {
    const GB: u64 = 1024 * 1024 * 1024;
    DatastoreRecord {
        id: format!("datastore-{}", slug(name)),
        name: name.to_string(),
        kind: "VMFS".into(),
        capacity_bytes: capacity_gb * GB,
        free_bytes: free_gb * GB,
        accessible: true,
    }
}

pub fn network(name: &str) -> NetworkRecord {
    NetworkRecord {
        id: format!("network-{}", slug(name)),
        name: name.to_string(),
        accessible: Some(true),
    }
}

pub fn snapshot(name: &str, day: u32, children: Vec<SnapshotNode>) -> SnapshotNode {
    let created = Utc
        .with_ymd_and_hms(2025, 1, day.clamp(1, 28), 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    SnapshotNode::leaf(name, created).with_children(children)
}

pub fn alarm(entity: &str, alarm: &str, status: &str) -> TriggeredAlarm {
    TriggeredAlarm {
        entity: entity.to_string(),
        alarm: alarm.to_string(),
        status: status.to_string(),
        acknowledged: false,
    }
}

/// A small lab inventory for demos and offline runs.
pub fn lab() -> (Vec<ManagedEntity>, Vec<TriggeredAlarm>) {
    let mut web = vm("web-01", PowerState::PoweredOn);
    web.ip_address = "10.20.0.11".into();
    web.hostname = "web-01.lab.local".into();
    web.snapshots = Some(vec![snapshot(
        "pre-upgrade",
        3,
        vec![snapshot("post-upgrade", 4, vec![]), snapshot("hotfix", 9, vec![])],
    )]);

    let mut db = vm("db-02", PowerState::PoweredOn);
    db.num_cpu = 8;
    db.memory_mb = 32768;
    db.host = "esxi-02.lab.local".into();
    db.annotation = "Primary PostgreSQL".into();

    let build = vm("build-agent", PowerState::PoweredOff);

    let entities = vec![
        ManagedEntity::VirtualMachine(web),
        ManagedEntity::VirtualMachine(db),
        ManagedEntity::VirtualMachine(build),
        ManagedEntity::Host(host("esxi-01.lab.local")),
        ManagedEntity::Host(host("esxi-02.lab.local")),
        ManagedEntity::Datastore(datastore("datastore1", 2048, 612)),
        ManagedEntity::Datastore(datastore("vsanDatastore", 8192, 5120)),
        ManagedEntity::Network(network("VM Network")),
        ManagedEntity::Network(network("Management")),
    ];
    let alarms = vec![alarm("esxi-02.lab.local", "Host memory usage", "yellow")];
    (entities, alarms)
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}
