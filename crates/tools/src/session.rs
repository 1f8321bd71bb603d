//! Session discipline for action tools.
//!
//! Every action tool runs the same sequence:
//!
//! 1. parse arguments, then check the safety gate (no remote contact on refusal)
//! 2. open a fresh session; the connector bounds its own login
//! 3. perform the action through [`Remote`], each remote call under the call timeout
//! 4. close the session exactly once, whatever happened in step 3
//!
//! Remote failures become a `{"status": "error"}` payload. Not-found,
//! refusal, already-in-state and not-supported outcomes are ordinary payloads.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use vcassist_config::VcenterConfig;
use vcassist_core::error::{InventoryError, ToolError};
use vcassist_core::inventory::*;
use vcassist_core::tool::{Tool, ToolOutcome, ToolResult};

/// Timeouts applied around remote calls.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Bound on closing a session. Connectors apply the same bound to login.
    pub session_timeout: Duration,
    /// Bound on each individual call inside a session
    pub call_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &VcenterConfig) -> Self {
        Self {
            session_timeout: Duration::from_secs(config.session_timeout_secs),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(60),
        }
    }
}

/// One operation against the managed inventory.
///
/// Implementations only describe the read or mutation; [`ActionTool`] owns
/// the session around it.
#[async_trait]
pub trait InventoryAction: Send + Sync + 'static {
    type Args: DeserializeOwned + Send;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn parameters_schema(&self) -> Value;

    /// Refusal payload for arguments that must not reach the managed
    /// system. Checked before any session is opened.
    fn gate(&self, _args: &Self::Args) -> Option<Value> {
        None
    }

    async fn perform(&self, remote: &Remote<'_>, args: Self::Args) -> Result<Value, InventoryError>;
}

/// Adapts an [`InventoryAction`] to the [`Tool`] calling convention.
pub struct ActionTool<A> {
    action: A,
    connector: Arc<dyn InventoryConnector>,
    settings: SessionSettings,
}

impl<A: InventoryAction> ActionTool<A> {
    pub fn new(action: A, connector: Arc<dyn InventoryConnector>, settings: SessionSettings) -> Self {
        Self {
            action,
            connector,
            settings,
        }
    }

    async fn close(&self, session: &dyn InventorySession) {
        let limit = self.settings.session_timeout;
        match tokio::time::timeout(limit, session.close()).await {
            Ok(Ok(())) => debug!(tool = self.action.name(), "Session closed"),
            Ok(Err(e)) => warn!(tool = self.action.name(), error = %e, "Session close failed"),
            Err(_) => warn!(tool = self.action.name(), "Session close timed out"),
        }
    }

    async fn run(&self, args: A::Args) -> Result<Value, InventoryError> {
        // Not cancelled from here: a login dropped mid-flight may leave a
        // remote session that nothing closes.
        let session = self.connector.open_session().await?;
        debug!(tool = self.action.name(), endpoint = self.connector.endpoint(), "Session opened");

        let remote = Remote::new(
            session.as_ref(),
            self.connector.endpoint(),
            self.settings.call_timeout,
        );
        let result = self.action.perform(&remote, args).await;

        self.close(session.as_ref()).await;
        result
    }
}

#[async_trait]
impl<A: InventoryAction> Tool for ActionTool<A> {
    fn name(&self) -> &str {
        self.action.name()
    }

    fn description(&self) -> &str {
        self.action.description()
    }

    fn parameters_schema(&self) -> Value {
        self.action.parameters_schema()
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let args: A::Args = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        if let Some(refusal) = self.action.gate(&args) {
            debug!(tool = self.action.name(), "Refused by safety gate");
            return Ok(ToolResult::from_payload(ToolOutcome::Success, &refusal));
        }

        let started = Instant::now();
        let result = self.run(args).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        Ok(match result {
            Ok(payload) => {
                debug!(tool = self.action.name(), duration_ms, "Action complete");
                ToolResult::from_payload(ToolOutcome::Success, &payload)
            }
            Err(InventoryError::Unsupported { operation, endpoint }) => {
                debug!(tool = self.action.name(), duration_ms, %operation, "Not supported by endpoint");
                ToolResult::from_payload(ToolOutcome::Success, &not_supported(&operation, &endpoint))
            }
            Err(e) => {
                warn!(tool = self.action.name(), duration_ms, error = %e, "Action failed");
                ToolResult::from_payload(ToolOutcome::ToolReportedError, &error_payload(&e))
            }
        })
    }
}

/// A session handle that bounds every call and always releases views.
pub struct Remote<'a> {
    session: &'a dyn InventorySession,
    endpoint: &'a str,
    call_timeout: Duration,
}

impl<'a> Remote<'a> {
    pub fn new(session: &'a dyn InventorySession, endpoint: &'a str, call_timeout: Duration) -> Self {
        Self {
            session,
            endpoint,
            call_timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint
    }

    async fn call<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, InventoryError>>,
    ) -> Result<T, InventoryError> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(InventoryError::Timeout {
                operation: operation.to_string(),
                timeout_secs: self.call_timeout.as_secs(),
            }),
        }
    }

    /// Every entity of `kind`, read through a view that is released before
    /// returning.
    pub async fn all(&self, kind: EntityKind) -> Result<Vec<ManagedEntity>, InventoryError> {
        let view = self.call("create view", self.session.list_entities(kind)).await?;
        let entries = self.call("read view", view.entries()).await;

        if let Err(e) = self.call("release view", view.release()).await {
            warn!(kind = %kind, error = %e, "View release failed");
        }
        entries
    }

    /// First entity of `kind` whose name matches case-insensitively.
    pub async fn find(&self, kind: EntityKind, name: &str) -> Result<Option<ManagedEntity>, InventoryError> {
        let wanted = name.to_lowercase();
        Ok(self
            .all(kind)
            .await?
            .into_iter()
            .find(|e| e.name().to_lowercase() == wanted))
    }

    pub async fn vms(&self) -> Result<Vec<VmRecord>, InventoryError> {
        Ok(self
            .all(EntityKind::VirtualMachine)
            .await?
            .into_iter()
            .filter_map(|e| match e {
                ManagedEntity::VirtualMachine(vm) => Some(vm),
                _ => None,
            })
            .collect())
    }

    pub async fn hosts(&self) -> Result<Vec<HostRecord>, InventoryError> {
        Ok(self
            .all(EntityKind::Host)
            .await?
            .into_iter()
            .filter_map(|e| match e {
                ManagedEntity::Host(host) => Some(host),
                _ => None,
            })
            .collect())
    }

    pub async fn find_vm(&self, name: &str) -> Result<Option<VmRecord>, InventoryError> {
        Ok(match self.find(EntityKind::VirtualMachine, name).await? {
            Some(ManagedEntity::VirtualMachine(vm)) => Some(vm),
            _ => None,
        })
    }

    pub async fn find_host(&self, name: &str) -> Result<Option<HostRecord>, InventoryError> {
        Ok(match self.find(EntityKind::Host, name).await? {
            Some(ManagedEntity::Host(host)) => Some(host),
            _ => None,
        })
    }

    pub async fn triggered_alarms(&self) -> Result<Vec<TriggeredAlarm>, InventoryError> {
        self.call("triggered alarms", self.session.triggered_alarms()).await
    }

    pub async fn power_on(&self, vm_id: &str) -> Result<TaskHandle, InventoryError> {
        self.call("power on", self.session.power_on(vm_id)).await
    }

    pub async fn power_off(&self, vm_id: &str) -> Result<TaskHandle, InventoryError> {
        self.call("power off", self.session.power_off(vm_id)).await
    }

    pub async fn reset(&self, vm_id: &str) -> Result<TaskHandle, InventoryError> {
        self.call("reset", self.session.reset(vm_id)).await
    }

    pub async fn create_snapshot(&self, vm_id: &str, spec: SnapshotSpec) -> Result<TaskHandle, InventoryError> {
        self.call("create snapshot", self.session.create_snapshot(vm_id, spec)).await
    }
}

/// Arguments of tools that take none. Unknown keys are ignored.
#[derive(Debug, Default, serde::Deserialize)]
pub struct NoArgs {}

// ── Payloads ──────────────────────────────────────────────────────────────

pub fn not_found(kind: EntityKind, name: &str) -> Value {
    json!({
        "status": "not_found",
        "error": format!("{} '{}' not found", kind.label(), name),
    })
}

pub fn refused(message: &str) -> Value {
    json!({ "status": "refused", "error": message })
}

/// A capability the connected platform does not offer. Retrying cannot help.
pub fn not_supported(operation: &str, endpoint: &str) -> Value {
    json!({
        "status": "not_supported",
        "error": format!("{operation} is not supported by {endpoint}"),
    })
}

pub fn error_payload(error: &InventoryError) -> Value {
    json!({ "status": "error", "error": error.to_string() })
}

/// Bytes to GiB, rounded to two decimals.
pub fn gib(bytes: u64) -> f64 {
    round2(bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use vcassist_inventory::{Fault, Reply, RestConnector, ScriptedEndpoint, SimulatedInventory};

    /// Reads the VM list, optionally refusing first.
    struct CountVms;

    #[derive(Deserialize)]
    struct CountArgs {
        #[serde(default)]
        refuse: bool,
    }

    #[async_trait]
    impl InventoryAction for CountVms {
        type Args = CountArgs;

        fn name(&self) -> &'static str {
            "count_vms"
        }

        fn description(&self) -> &'static str {
            "Count VMs"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"refuse": {"type": "boolean"}}})
        }

        fn gate(&self, args: &CountArgs) -> Option<Value> {
            args.refuse.then(|| refused("refused"))
        }

        async fn perform(&self, remote: &Remote<'_>, _args: CountArgs) -> Result<Value, InventoryError> {
            Ok(json!({ "count": remote.vms().await?.len() }))
        }
    }

    fn tool(inventory: &SimulatedInventory, settings: SessionSettings) -> ActionTool<CountVms> {
        ActionTool::new(CountVms, Arc::new(inventory.clone()), settings)
    }

    fn payload(result: &ToolResult) -> Value {
        serde_json::from_str(&result.output).unwrap()
    }

    #[tokio::test]
    async fn success_closes_session_and_releases_view() {
        let inventory = SimulatedInventory::lab();
        let result = tool(&inventory, SessionSettings::default())
            .execute(json!({}))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(payload(&result)["count"], 3);
        let stats = inventory.stats();
        assert_eq!((stats.sessions_opened, stats.sessions_closed), (1, 1));
        assert_eq!((stats.views_opened, stats.views_released), (1, 1));
    }

    #[tokio::test]
    async fn null_arguments_are_treated_as_empty() {
        let inventory = SimulatedInventory::lab();
        let result = tool(&inventory, SessionSettings::default())
            .execute(Value::Null)
            .await
            .unwrap();
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn gate_refusal_never_opens_a_session() {
        let inventory = SimulatedInventory::lab();
        let result = tool(&inventory, SessionSettings::default())
            .execute(json!({"refuse": true}))
            .await
            .unwrap();

        assert_eq!(payload(&result)["status"], "refused");
        assert_eq!(inventory.stats().sessions_opened, 0);
    }

    #[tokio::test]
    async fn read_failure_still_releases_and_closes() {
        let inventory = SimulatedInventory::lab();
        inventory.inject_fault(Fault::ReadEntries);

        let result = tool(&inventory, SessionSettings::default())
            .execute(json!({}))
            .await
            .unwrap();

        assert_eq!(result.outcome, ToolOutcome::ToolReportedError);
        assert_eq!(payload(&result)["status"], "error");
        let stats = inventory.stats();
        assert_eq!(stats.sessions_closed, 1);
        assert_eq!(stats.views_released, 1);
    }

    #[tokio::test]
    async fn open_failure_is_reported_without_close() {
        let inventory = SimulatedInventory::lab();
        inventory.inject_fault(Fault::OpenSession);

        let result = tool(&inventory, SessionSettings::default())
            .execute(json!({}))
            .await
            .unwrap();

        assert_eq!(result.outcome, ToolOutcome::ToolReportedError);
        assert!(payload(&result)["error"].as_str().unwrap().contains("simulated"));
        assert_eq!(inventory.stats().sessions_closed, 0);
    }

    #[tokio::test]
    async fn close_failure_does_not_mask_result() {
        let inventory = SimulatedInventory::lab();
        inventory.inject_fault(Fault::CloseSession);

        let result = tool(&inventory, SessionSettings::default())
            .execute(json!({}))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(inventory.stats().sessions_closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_and_still_closes() {
        let inventory = SimulatedInventory::lab();
        inventory.set_latency(Duration::from_secs(5));
        let settings = SessionSettings {
            session_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(1),
        };

        let result = tool(&inventory, settings).execute(json!({})).await.unwrap();

        assert_eq!(result.outcome, ToolOutcome::ToolReportedError);
        assert!(payload(&result)["error"].as_str().unwrap().contains("timed out"));
        assert_eq!(inventory.stats().sessions_closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_login_is_not_abandoned() {
        let inventory = SimulatedInventory::lab();
        inventory.set_latency(Duration::from_secs(45));
        let settings = SessionSettings {
            session_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(60),
        };

        let result = tool(&inventory, settings).execute(json!({})).await.unwrap();

        assert!(result.is_success());
        let stats = inventory.stats();
        assert_eq!((stats.sessions_opened, stats.sessions_closed), (1, 1));
    }

    #[tokio::test]
    async fn http_read_failure_closes_the_remote_session_once() {
        let endpoint = ScriptedEndpoint::new()
            .route("POST", "/api/session", Reply::json(201, r#""tok-1""#))
            .route("DELETE", "/api/session", Reply::no_content())
            .route("GET", "/api/vcenter/vm", Reply::json(500, r#"{"error_type":"ERROR"}"#))
            .start()
            .await
            .unwrap();
        let connector = RestConnector::new(endpoint.base_url(), "u", "p", true, Duration::from_secs(5));
        let tool = ActionTool::new(CountVms, Arc::new(connector), SessionSettings::default());

        let result = tool.execute(json!({})).await.unwrap();

        assert_eq!(result.outcome, ToolOutcome::ToolReportedError);
        assert!(payload(&result)["error"].as_str().unwrap().contains("status 500"));
        assert_eq!(endpoint.count("POST", "/api/session").await, 1);
        assert_eq!(endpoint.count("DELETE", "/api/session").await, 1);
    }

    #[tokio::test]
    async fn malformed_arguments_are_a_tool_error() {
        let inventory = SimulatedInventory::lab();
        let err = tool(&inventory, SessionSettings::default())
            .execute(json!({"refuse": "maybe"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert_eq!(inventory.stats().sessions_opened, 0);
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(gib(1024 * 1024 * 1024), 1.0);
        assert_eq!(gib(1_610_612_736), 1.5);
        assert_eq!(round2(2.345_67), 2.35);
    }

    #[test]
    fn not_found_names_the_entity() {
        let payload = not_found(EntityKind::VirtualMachine, "WEB-01");
        assert_eq!(payload["error"], "VM 'WEB-01' not found");
    }
}
