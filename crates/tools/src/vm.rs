//! Virtual machine tools: listing, details, and power operations.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use vcassist_core::error::InventoryError;
use vcassist_core::inventory::{EntityKind, PowerState, TaskHandle, VmRecord};

use crate::session::{InventoryAction, NoArgs, Remote, not_found, refused};

#[derive(Debug, Deserialize)]
pub struct VmNameArgs {
    pub vm_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmedVmArgs {
    pub vm_name: String,
    #[serde(default)]
    pub confirm: bool,
}

fn vm_name_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "vm_name": { "type": "string", "description": "VM name (case-insensitive)" }
        },
        "required": ["vm_name"]
    })
}

fn confirmed_vm_schema(action: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "vm_name": { "type": "string", "description": "VM name (case-insensitive)" },
            "confirm": {
                "type": "boolean",
                "default": false,
                "description": format!("Must be true to {action} the VM")
            }
        },
        "required": ["vm_name"]
    })
}

fn summary(vm: &VmRecord) -> Value {
    json!({
        "name": vm.name,
        "power_state": vm.power_state,
        "num_cpu": vm.num_cpu,
        "memory_mb": vm.memory_mb,
        "guest_os": vm.guest_os,
        "ip_address": vm.ip_address,
        "host": vm.host,
    })
}

fn details(vm: &VmRecord) -> Value {
    json!({
        "name": vm.name,
        "power_state": vm.power_state,
        "num_cpu": vm.num_cpu,
        "memory_mb": vm.memory_mb,
        "guest_os": vm.guest_os,
        "ip_address": vm.ip_address,
        "hostname": vm.hostname,
        "host": vm.host,
        "tools_status": vm.tools_status,
        "annotation": vm.annotation,
        "num_disks": vm.num_disks,
    })
}

/// `task_id` is null when the platform accepted the task without naming it.
fn task_started(status: &str, vm: &VmRecord, task: &TaskHandle) -> Value {
    json!({ "status": status, "vm": vm.name, "task_id": task.task_id })
}

fn already(status: &str, vm: &VmRecord) -> Value {
    json!({ "status": status, "vm": vm.name })
}

pub struct ListVms;

#[async_trait]
impl InventoryAction for ListVms {
    type Args = NoArgs;

    fn name(&self) -> &'static str {
        "list_vms"
    }

    fn description(&self) -> &'static str {
        "List all virtual machines with their power state, CPU, memory, and IP."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn perform(&self, remote: &Remote<'_>, _args: NoArgs) -> Result<Value, InventoryError> {
        let vms = remote.vms().await?;
        Ok(Value::Array(vms.iter().map(summary).collect()))
    }
}

pub struct GetVmDetails;

#[async_trait]
impl InventoryAction for GetVmDetails {
    type Args = VmNameArgs;

    fn name(&self) -> &'static str {
        "get_vm_details"
    }

    fn description(&self) -> &'static str {
        "Get detailed information about a specific VM by name."
    }

    fn parameters_schema(&self) -> Value {
        vm_name_schema()
    }

    async fn perform(&self, remote: &Remote<'_>, args: VmNameArgs) -> Result<Value, InventoryError> {
        Ok(match remote.find_vm(&args.vm_name).await? {
            Some(vm) => details(&vm),
            None => not_found(EntityKind::VirtualMachine, &args.vm_name),
        })
    }
}

pub struct PowerOnVm;

#[async_trait]
impl InventoryAction for PowerOnVm {
    type Args = VmNameArgs;

    fn name(&self) -> &'static str {
        "power_on_vm"
    }

    fn description(&self) -> &'static str {
        "Power on a virtual machine by name."
    }

    fn parameters_schema(&self) -> Value {
        vm_name_schema()
    }

    async fn perform(&self, remote: &Remote<'_>, args: VmNameArgs) -> Result<Value, InventoryError> {
        let Some(vm) = remote.find_vm(&args.vm_name).await? else {
            return Ok(not_found(EntityKind::VirtualMachine, &args.vm_name));
        };
        if vm.power_state == PowerState::PoweredOn {
            return Ok(already("already powered on", &vm));
        }

        let task = remote.power_on(&vm.id).await?;
        info!(vm = %vm.name, task_id = ?task.task_id, "Power on requested");
        Ok(task_started("power on task started", &vm, &task))
    }
}

pub struct PowerOffVm;

#[async_trait]
impl InventoryAction for PowerOffVm {
    type Args = ConfirmedVmArgs;

    fn name(&self) -> &'static str {
        "power_off_vm"
    }

    fn description(&self) -> &'static str {
        "Power off a virtual machine by name. Requires confirm=true to prevent accidental shutdown."
    }

    fn parameters_schema(&self) -> Value {
        confirmed_vm_schema("power off")
    }

    fn gate(&self, args: &ConfirmedVmArgs) -> Option<Value> {
        (!args.confirm).then(|| refused("Set confirm=true to power off the VM."))
    }

    async fn perform(&self, remote: &Remote<'_>, args: ConfirmedVmArgs) -> Result<Value, InventoryError> {
        let Some(vm) = remote.find_vm(&args.vm_name).await? else {
            return Ok(not_found(EntityKind::VirtualMachine, &args.vm_name));
        };
        if vm.power_state == PowerState::PoweredOff {
            return Ok(already("already powered off", &vm));
        }

        let task = remote.power_off(&vm.id).await?;
        info!(vm = %vm.name, task_id = ?task.task_id, "Power off requested");
        Ok(task_started("power off task started", &vm, &task))
    }
}

pub struct RestartVm;

#[async_trait]
impl InventoryAction for RestartVm {
    type Args = ConfirmedVmArgs;

    fn name(&self) -> &'static str {
        "restart_vm"
    }

    fn description(&self) -> &'static str {
        "Restart a virtual machine by name. Requires confirm=true to prevent accidental restart."
    }

    fn parameters_schema(&self) -> Value {
        confirmed_vm_schema("restart")
    }

    fn gate(&self, args: &ConfirmedVmArgs) -> Option<Value> {
        (!args.confirm).then(|| refused("Set confirm=true to restart the VM."))
    }

    async fn perform(&self, remote: &Remote<'_>, args: ConfirmedVmArgs) -> Result<Value, InventoryError> {
        let Some(vm) = remote.find_vm(&args.vm_name).await? else {
            return Ok(not_found(EntityKind::VirtualMachine, &args.vm_name));
        };
        // A hard reset of a stopped VM would power it on
        if vm.power_state != PowerState::PoweredOn {
            return Ok(json!({
                "status": "precondition not met",
                "vm": vm.name,
                "power_state": vm.power_state,
                "error": "VM is not powered on; use power_on_vm instead.",
            }));
        }

        let task = remote.reset(&vm.id).await?;
        info!(vm = %vm.name, task_id = ?task.task_id, "Restart requested");
        Ok(task_started("restart task started", &vm, &task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ActionTool, SessionSettings};
    use std::sync::Arc;
    use vcassist_core::tool::Tool;
    use std::time::Duration;
    use vcassist_inventory::{Fault, Reply, RestConnector, ScriptedEndpoint, SimulatedInventory};

    fn tool<A: InventoryAction>(action: A, inventory: &SimulatedInventory) -> ActionTool<A> {
        ActionTool::new(action, Arc::new(inventory.clone()), SessionSettings::default())
    }

    async fn run<A: InventoryAction>(action: A, inventory: &SimulatedInventory, args: Value) -> Value {
        let result = tool(action, inventory).execute(args).await.unwrap();
        serde_json::from_str(&result.output).unwrap()
    }

    #[tokio::test]
    async fn list_vms_reports_every_vm() {
        let inventory = SimulatedInventory::lab();
        let payload = run(ListVms, &inventory, json!({})).await;

        let vms = payload.as_array().unwrap();
        assert_eq!(vms.len(), 3);
        assert_eq!(vms[0]["name"], "web-01");
        assert_eq!(vms[0]["power_state"], "poweredOn");
        assert_eq!(vms[0]["ip_address"], "10.20.0.11");
        assert!(vms[0].get("annotation").is_none());
    }

    #[tokio::test]
    async fn details_match_case_insensitively() {
        let inventory = SimulatedInventory::lab();
        let payload = run(GetVmDetails, &inventory, json!({"vm_name": "DB-02"})).await;

        assert_eq!(payload["name"], "db-02");
        assert_eq!(payload["num_cpu"], 8);
        assert_eq!(payload["annotation"], "Primary PostgreSQL");
        assert_eq!(inventory.stats().sessions_closed, 1);
    }

    #[tokio::test]
    async fn details_not_found_references_requested_name() {
        let inventory = SimulatedInventory::lab();
        let payload = run(GetVmDetails, &inventory, json!({"vm_name": "WEB-99"})).await;

        assert_eq!(payload["status"], "not_found");
        assert!(payload["error"].as_str().unwrap().contains("WEB-99"));
        let stats = inventory.stats();
        assert_eq!(stats.sessions_closed, 1);
        assert_eq!(stats.views_released, 1);
    }

    #[tokio::test]
    async fn power_off_without_confirm_is_refused_offline() {
        let inventory = SimulatedInventory::lab();
        let payload = run(PowerOffVm, &inventory, json!({"vm_name": "DB-02"})).await;

        assert_eq!(payload["status"], "refused");
        assert_eq!(inventory.stats().sessions_opened, 0);
        assert_eq!(inventory.power_state("vm-db-02").await, Some(PowerState::PoweredOn));
    }

    #[tokio::test]
    async fn power_off_confirmed_starts_task() {
        let inventory = SimulatedInventory::lab();
        let payload = run(PowerOffVm, &inventory, json!({"vm_name": "DB-02", "confirm": true})).await;

        assert_eq!(payload["status"], "power off task started");
        assert_eq!(payload["vm"], "db-02");
        assert_eq!(payload["task_id"], "task-1");
        assert_eq!(inventory.stats().mutating_calls, 1);
        assert_eq!(inventory.stats().sessions_closed, 1);
    }

    #[tokio::test]
    async fn power_off_already_off_issues_no_mutation() {
        let inventory = SimulatedInventory::lab();
        let payload = run(
            PowerOffVm,
            &inventory,
            json!({"vm_name": "build-agent", "confirm": true}),
        )
        .await;

        assert_eq!(payload["status"], "already powered off");
        assert_eq!(inventory.stats().mutating_calls, 0);
        assert_eq!(inventory.stats().sessions_closed, 1);
    }

    #[tokio::test]
    async fn power_on_already_on_issues_no_mutation() {
        let inventory = SimulatedInventory::lab();
        let payload = run(PowerOnVm, &inventory, json!({"vm_name": "web-01"})).await;

        assert_eq!(payload["status"], "already powered on");
        assert_eq!(inventory.stats().mutating_calls, 0);
    }

    #[tokio::test]
    async fn power_on_stopped_vm() {
        let inventory = SimulatedInventory::lab();
        let payload = run(PowerOnVm, &inventory, json!({"vm_name": "Build-Agent"})).await;

        assert_eq!(payload["status"], "power on task started");
        assert_eq!(
            inventory.power_state("vm-build-agent").await,
            Some(PowerState::PoweredOn)
        );
    }

    #[tokio::test]
    async fn restart_requires_confirm() {
        let inventory = SimulatedInventory::lab();
        let payload = run(RestartVm, &inventory, json!({"vm_name": "web-01", "confirm": false})).await;

        assert_eq!(payload["error"], "Set confirm=true to restart the VM.");
        assert_eq!(inventory.stats().sessions_opened, 0);
    }

    #[tokio::test]
    async fn restart_of_stopped_vm_is_a_precondition_no_op() {
        let inventory = SimulatedInventory::lab();
        let payload = run(
            RestartVm,
            &inventory,
            json!({"vm_name": "build-agent", "confirm": true}),
        )
        .await;

        assert_eq!(payload["status"], "precondition not met");
        assert_eq!(inventory.stats().mutating_calls, 0);
        assert_eq!(inventory.stats().sessions_closed, 1);
    }

    #[tokio::test]
    async fn restart_running_vm_resets() {
        let inventory = SimulatedInventory::lab();
        let payload = run(RestartVm, &inventory, json!({"vm_name": "web-01", "confirm": true})).await;

        assert_eq!(payload["status"], "restart task started");
        assert_eq!(inventory.mutations().await[0].operation, "reset");
    }

    #[tokio::test]
    async fn mutation_failure_is_reported_and_session_closed() {
        let inventory = SimulatedInventory::lab();
        inventory.inject_fault(Fault::Mutation);

        let result = tool(PowerOnVm, &inventory)
            .execute(json!({"vm_name": "build-agent"}))
            .await
            .unwrap();

        assert!(!result.is_success());
        assert!(result.output.contains("injected fault"));
        assert_eq!(inventory.stats().sessions_closed, 1);
        assert_eq!(inventory.stats().views_released, 1);
    }

    #[tokio::test]
    async fn power_off_over_rest_accepts_empty_reply_as_started() {
        let endpoint = ScriptedEndpoint::new()
            .route("POST", "/api/session", Reply::json(201, r#""tok-1""#))
            .route("DELETE", "/api/session", Reply::no_content())
            .route(
                "GET",
                "/api/vcenter/vm",
                Reply::json(200, r#"[{"vm":"vm-42","name":"db-02","power_state":"POWERED_ON"}]"#),
            )
            .route("GET", "/api/vcenter/host", Reply::json(200, "[]"))
            .route("GET", "/api/vcenter/vm/vm-42", Reply::json(200, "{}"))
            .route("GET", "/api/vcenter/vm/vm-42/guest/identity", Reply::json(200, "{}"))
            .route("POST", "/api/vcenter/vm/vm-42/power?action=stop", Reply::no_content())
            .start()
            .await
            .unwrap();
        let connector = RestConnector::new(endpoint.base_url(), "u", "p", true, Duration::from_secs(5));
        let tool = ActionTool::new(PowerOffVm, Arc::new(connector), SessionSettings::default());

        let result = tool
            .execute(json!({"vm_name": "DB-02", "confirm": true}))
            .await
            .unwrap();

        assert!(result.is_success());
        let payload: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(payload["status"], "power off task started");
        assert_eq!(payload["vm"], "db-02");
        assert!(payload["task_id"].is_null());
        assert_eq!(endpoint.count("POST", "/api/vcenter/vm/vm-42/power?action=stop").await, 1);
        assert_eq!(endpoint.count("DELETE", "/api/session").await, 1);
    }
}
