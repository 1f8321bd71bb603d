//! Environment-wide overview tools.

use async_trait::async_trait;
use serde_json::{Value, json};
use vcassist_core::error::InventoryError;
use vcassist_core::inventory::{EntityKind, PowerState};

use crate::session::{InventoryAction, NoArgs, Remote};

pub struct GetInventorySummary;

#[async_trait]
impl InventoryAction for GetInventorySummary {
    type Args = NoArgs;

    fn name(&self) -> &'static str {
        "get_inventory_summary"
    }

    fn description(&self) -> &'static str {
        "Return a high-level count of VMs, hosts, and datastores in the environment."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn perform(&self, remote: &Remote<'_>, _args: NoArgs) -> Result<Value, InventoryError> {
        let vms = remote.vms().await?;
        let total_hosts = remote.all(EntityKind::Host).await?.len();
        let total_datastores = remote.all(EntityKind::Datastore).await?.len();

        let powered_on = vms
            .iter()
            .filter(|vm| vm.power_state == PowerState::PoweredOn)
            .count();

        Ok(json!({
            "total_vms": vms.len(),
            "powered_on_vms": powered_on,
            "powered_off_vms": vms.len() - powered_on,
            "total_hosts": total_hosts,
            "total_datastores": total_datastores,
        }))
    }
}

pub struct GetAlarms;

#[async_trait]
impl InventoryAction for GetAlarms {
    type Args = NoArgs;

    fn name(&self) -> &'static str {
        "get_alarms"
    }

    fn description(&self) -> &'static str {
        "Return any triggered alarms in the vCenter environment."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn perform(&self, remote: &Remote<'_>, _args: NoArgs) -> Result<Value, InventoryError> {
        let alarms = remote.triggered_alarms().await?;
        serde_json::to_value(alarms).map_err(|e| InventoryError::Decode(e.to_string()))
    }
}
