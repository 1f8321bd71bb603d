use async_trait::async_trait;
use serde_json::{Value, json};
use vcassist_core::error::InventoryError;
use vcassist_core::inventory::{DatastoreRecord, EntityKind, ManagedEntity};

use crate::session::{InventoryAction, NoArgs, Remote, gib};

fn record(ds: &DatastoreRecord) -> Value {
    json!({
        "name": ds.name,
        "type": ds.kind,
        "capacity_gb": gib(ds.capacity_bytes),
        "free_gb": gib(ds.free_bytes),
        "used_gb": gib(ds.capacity_bytes.saturating_sub(ds.free_bytes)),
        "accessible": ds.accessible,
    })
}

pub struct ListDatastores;

#[async_trait]
impl InventoryAction for ListDatastores {
    type Args = NoArgs;

    fn name(&self) -> &'static str {
        "list_datastores"
    }

    fn description(&self) -> &'static str {
        "List all datastores with capacity, free space, and accessibility."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn perform(&self, remote: &Remote<'_>, _args: NoArgs) -> Result<Value, InventoryError> {
        let entities = remote.all(EntityKind::Datastore).await?;
        Ok(entities
            .iter()
            .filter_map(|e| match e {
                ManagedEntity::Datastore(ds) => Some(record(ds)),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ActionTool, SessionSettings};
    use std::sync::Arc;
    use vcassist_core::tool::Tool;
    use vcassist_inventory::SimulatedInventory;

    #[tokio::test]
    async fn datastores_report_used_space() {
        let inventory = SimulatedInventory::lab();
        let tool = ActionTool::new(ListDatastores, Arc::new(inventory.clone()), SessionSettings::default());
        let result = tool.execute(json!({})).await.unwrap();
        let payload: Value = serde_json::from_str(&result.output).unwrap();

        let first = &payload[0];
        assert_eq!(first["name"], "datastore1");
        assert_eq!(first["type"], "VMFS");
        assert_eq!(first["capacity_gb"], 2048.0);
        assert_eq!(first["free_gb"], 612.0);
        assert_eq!(first["used_gb"], 1436.0);
        assert_eq!(inventory.stats().views_released, 1);
    }

    #[test]
    fn free_space_larger_than_capacity_does_not_underflow() {
        let ds = DatastoreRecord {
            id: "ds-1".into(),
            name: "nfs".into(),
            kind: "NFS".into(),
            capacity_bytes: 10,
            free_bytes: 20,
            accessible: false,
        };
        assert_eq!(record(&ds)["used_gb"], 0.0);
    }
}
