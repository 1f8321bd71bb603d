//! Catalog assembly: every vCenter action tool plus the runbook search
//! tool, in one flat registry.

use std::sync::Arc;
use vcassist_core::error::DispatchError;
use vcassist_core::inventory::InventoryConnector;
use vcassist_core::tool::{Tool, ToolRegistry};

use crate::datastore::ListDatastores;
use crate::host::{GetHostPerformance, ListHosts};
use crate::network::ListNetworks;
use crate::overview::{GetAlarms, GetInventorySummary};
use crate::search_runbooks::SearchRunbooksTool;
use crate::session::{ActionTool, InventoryAction, SessionSettings};
use crate::snapshot::{CreateVmSnapshot, ListVmSnapshots};
use crate::vm::{GetVmDetails, ListVms, PowerOffVm, PowerOnVm, RestartVm};

/// The vCenter action tools, in catalog order.
pub fn action_tools(
    connector: Arc<dyn InventoryConnector>,
    settings: SessionSettings,
) -> Vec<Box<dyn Tool>> {
    fn boxed<A: InventoryAction>(
        action: A,
        connector: &Arc<dyn InventoryConnector>,
        settings: SessionSettings,
    ) -> Box<dyn Tool> {
        Box::new(ActionTool::new(action, connector.clone(), settings))
    }

    vec![
        boxed(ListVms, &connector, settings),
        boxed(GetVmDetails, &connector, settings),
        boxed(PowerOnVm, &connector, settings),
        boxed(PowerOffVm, &connector, settings),
        boxed(RestartVm, &connector, settings),
        boxed(ListHosts, &connector, settings),
        boxed(GetHostPerformance, &connector, settings),
        boxed(ListDatastores, &connector, settings),
        boxed(ListNetworks, &connector, settings),
        boxed(ListVmSnapshots, &connector, settings),
        boxed(CreateVmSnapshot, &connector, settings),
        boxed(GetInventorySummary, &connector, settings),
        boxed(GetAlarms, &connector, settings),
    ]
}

/// Build the full catalog. Fails only on a duplicate tool name.
pub fn build_catalog(
    connector: Arc<dyn InventoryConnector>,
    settings: SessionSettings,
    search: SearchRunbooksTool,
) -> Result<ToolRegistry, DispatchError> {
    let mut registry = ToolRegistry::new();
    registry.register_all(action_tools(connector, settings))?;
    registry.register(Box::new(search))?;
    Ok(registry)
}
