//! ESXi host tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use vcassist_core::error::InventoryError;
use vcassist_core::inventory::{EntityKind, HostHardware, HostRecord};

use crate::session::{InventoryAction, NoArgs, Remote, gib, not_found, not_supported};

#[derive(Debug, Deserialize)]
pub struct HostNameArgs {
    pub host_name: String,
}

/// Hardware fields are left out when the connector cannot read them.
fn record(host: &HostRecord) -> Value {
    let mut record = json!({
        "name": host.name,
        "connection_state": host.connection_state,
        "power_state": host.power_state,
    });
    if let (Some(hw), Some(fields)) = (&host.hardware, record.as_object_mut()) {
        fields.insert("cpu_cores".into(), hw.cpu_cores.into());
        fields.insert("memory_gb".into(), gib(hw.memory_bytes).into());
        fields.insert("model".into(), hw.model.clone().into());
        fields.insert("vendor".into(), hw.vendor.clone().into());
        fields.insert("version".into(), hw.version.clone().into());
    }
    record
}

fn performance(host: &HostRecord, hw: &HostHardware) -> Value {
    json!({
        "name": host.name,
        "cpu_usage_mhz": hw.cpu_usage_mhz,
        "cpu_total_mhz": u64::from(hw.cpu_cores) * hw.cpu_hz / 1_000_000,
        "memory_usage_mb": hw.memory_usage_mb,
        "memory_total_mb": hw.memory_bytes / (1024 * 1024),
    })
}

pub struct ListHosts;

#[async_trait]
impl InventoryAction for ListHosts {
    type Args = NoArgs;

    fn name(&self) -> &'static str {
        "list_hosts"
    }

    fn description(&self) -> &'static str {
        "List all ESXi hosts with connection state, CPU cores, and memory."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn perform(&self, remote: &Remote<'_>, _args: NoArgs) -> Result<Value, InventoryError> {
        let hosts = remote.hosts().await?;
        Ok(Value::Array(hosts.iter().map(record).collect()))
    }
}

pub struct GetHostPerformance;

#[async_trait]
impl InventoryAction for GetHostPerformance {
    type Args = HostNameArgs;

    fn name(&self) -> &'static str {
        "get_host_performance"
    }

    fn description(&self) -> &'static str {
        "Get CPU and memory utilisation for a specific ESXi host."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "host_name": { "type": "string", "description": "Host name (case-insensitive)" }
            },
            "required": ["host_name"]
        })
    }

    async fn perform(&self, remote: &Remote<'_>, args: HostNameArgs) -> Result<Value, InventoryError> {
        Ok(match remote.find_host(&args.host_name).await? {
            Some(host) => match &host.hardware {
                Some(hw) => performance(&host, hw),
                None => not_supported("Host performance", remote.endpoint()),
            },
            None => not_found(EntityKind::Host, &args.host_name),
        })
    }
}
