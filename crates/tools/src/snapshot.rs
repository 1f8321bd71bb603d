//! Snapshot tools.
//!
//! A VM's snapshots form a tree (each snapshot may have child snapshots).
//! Listing flattens the whole tree depth-first in pre-order, so a parent
//! always appears before its children and siblings keep their order.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use vcassist_core::error::InventoryError;
use vcassist_core::inventory::{EntityKind, SnapshotNode, SnapshotSpec};

use crate::session::{InventoryAction, Remote, not_found, not_supported};
use crate::vm::VmNameArgs;

#[derive(Debug, Deserialize)]
pub struct CreateSnapshotArgs {
    pub vm_name: String,
    pub snapshot_name: String,
    #[serde(default)]
    pub description: String,
}

/// One row of a flattened snapshot tree.
#[derive(Debug, PartialEq)]
pub struct FlatSnapshot<'a> {
    pub node: &'a SnapshotNode,
    pub depth: usize,
}

/// Pre-order depth-first walk over every root and its descendants.
///
/// Uses an explicit stack, so depth is bounded only by the tree itself.
pub fn flatten(roots: &[SnapshotNode]) -> Vec<FlatSnapshot<'_>> {
    let mut out = Vec::new();
    let mut stack: Vec<(&SnapshotNode, usize)> = roots.iter().rev().map(|n| (n, 0)).collect();

    while let Some((node, depth)) = stack.pop() {
        out.push(FlatSnapshot { node, depth });
        stack.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
    }
    out
}

pub struct ListVmSnapshots;

#[async_trait]
impl InventoryAction for ListVmSnapshots {
    type Args = VmNameArgs;

    fn name(&self) -> &'static str {
        "list_vm_snapshots"
    }

    fn description(&self) -> &'static str {
        "List all snapshots for a specific VM."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "vm_name": { "type": "string", "description": "VM name (case-insensitive)" }
            },
            "required": ["vm_name"]
        })
    }

    async fn perform(&self, remote: &Remote<'_>, args: VmNameArgs) -> Result<Value, InventoryError> {
        let Some(vm) = remote.find_vm(&args.vm_name).await? else {
            return Ok(not_found(EntityKind::VirtualMachine, &args.vm_name));
        };
        let Some(roots) = vm.snapshots.as_deref() else {
            return Ok(not_supported("Snapshot listing", remote.endpoint()));
        };

        Ok(flatten(roots)
            .into_iter()
            .map(|flat| {
                json!({
                    "name": flat.node.name,
                    "description": flat.node.description,
                    "created": flat.node.created.to_rfc3339(),
                    "depth": flat.depth,
                })
            })
            .collect())
    }
}

pub struct CreateVmSnapshot;

#[async_trait]
impl InventoryAction for CreateVmSnapshot {
    type Args = CreateSnapshotArgs;

    fn name(&self) -> &'static str {
        "create_vm_snapshot"
    }

    fn description(&self) -> &'static str {
        "Create a snapshot of a VM."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "vm_name": { "type": "string", "description": "VM name (case-insensitive)" },
                "snapshot_name": { "type": "string", "description": "Name for the new snapshot" },
                "description": { "type": "string", "default": "" }
            },
            "required": ["vm_name", "snapshot_name"]
        })
    }

    async fn perform(&self, remote: &Remote<'_>, args: CreateSnapshotArgs) -> Result<Value, InventoryError> {
        let Some(vm) = remote.find_vm(&args.vm_name).await? else {
            return Ok(not_found(EntityKind::VirtualMachine, &args.vm_name));
        };

        let spec = SnapshotSpec {
            name: args.snapshot_name.clone(),
            description: args.description,
            memory: false,
            quiesce: false,
        };
        let task = remote.create_snapshot(&vm.id, spec).await?;
        info!(vm = %vm.name, snapshot = %args.snapshot_name, task_id = ?task.task_id, "Snapshot requested");

        Ok(json!({
            "status": "snapshot task started",
            "vm": vm.name,
            "snapshot": args.snapshot_name,
            "task_id": task.task_id,
        }))
    }
}
