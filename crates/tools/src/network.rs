use async_trait::async_trait;
use serde_json::{Value, json};
use vcassist_core::error::InventoryError;
use vcassist_core::inventory::{EntityKind, ManagedEntity};

use crate::session::{InventoryAction, NoArgs, Remote};

pub struct ListNetworks;

#[async_trait]
impl InventoryAction for ListNetworks {
    type Args = NoArgs;

    fn name(&self) -> &'static str {
        "list_networks"
    }

    fn description(&self) -> &'static str {
        "List all networks and port groups in the vCenter inventory."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn perform(&self, remote: &Remote<'_>, _args: NoArgs) -> Result<Value, InventoryError> {
        let entities = remote.all(EntityKind::Network).await?;
        Ok(entities
            .iter()
            .filter_map(|e| match e {
                ManagedEntity::Network(net) => Some(json!({
                    "name": net.name,
                    "accessible": net.accessible,
                })),
                _ => None,
            })
            .collect())
    }
}
