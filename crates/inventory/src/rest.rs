//! HTTP session connector for vCenter.
//!
//! Talks to the vSphere Automation REST API:
//!
//! | Call | Request |
//! |---|---|
//! | open session | `POST /api/session` (HTTP Basic) → token string |
//! | close session | `DELETE /api/session` |
//! | VMs | `GET /api/vcenter/vm`, then `GET /api/vcenter/vm/{vm}` and `GET /api/vcenter/vm/{vm}/guest/identity` per VM |
//! | VM placement | `GET /api/vcenter/vm?hosts={host}` per host |
//! | hosts | `GET /api/vcenter/host` |
//! | datastores | `GET /api/vcenter/datastore`, then `GET /api/vcenter/datastore/{ds}` per datastore |
//! | networks | `GET /api/vcenter/network` |
//! | power | `POST /api/vcenter/vm/{vm}/power?action=start\|stop\|reset` → `204 No Content` |
//!
//! Every request after login carries the `vmware-api-session-id` header.
//!
//! The collections are stateless, so a view is a client-side handle and
//! releasing it sends nothing. The API has no triggered-alarm, snapshot or
//! host hardware resources: alarms and snapshot creation fail with
//! [`InventoryError::Unsupported`], and VM snapshot trees and host hardware
//! are left as `None`.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use vcassist_config::VcenterConfig;
use vcassist_core::error::InventoryError;
use vcassist_core::inventory::*;

const SESSION_HEADER: &str = "vmware-api-session-id";

/// Per-entity detail requests in flight at once.
const DETAIL_CONCURRENCY: usize = 8;

/// Opens authenticated HTTP sessions against one vCenter endpoint.
pub struct RestConnector {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
    login_timeout: Duration,
}

impl RestConnector {
    /// `request_timeout` bounds every call; login uses it too unless
    /// [`with_login_timeout`](Self::with_login_timeout) says otherwise.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        ssl_verify: bool,
        request_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!ssl_verify)
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            client,
            login_timeout: request_timeout,
        }
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn from_config(config: &VcenterConfig) -> Self {
        Self::new(
            config.base_url(),
            &config.username,
            config.password.clone().unwrap_or_default(),
            config.ssl_verify,
            Duration::from_secs(config.call_timeout_secs),
        )
        .with_login_timeout(Duration::from_secs(config.session_timeout_secs))
    }
}

#[async_trait]
impl InventoryConnector for RestConnector {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn open_session(&self) -> Result<Box<dyn InventorySession>, InventoryError> {
        let url = format!("{}/api/session", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .timeout(self.login_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InventoryError::Timeout {
                        operation: "open session".into(),
                        timeout_secs: self.login_timeout.as_secs(),
                    }
                } else {
                    InventoryError::SessionOpen {
                        endpoint: self.base_url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(InventoryError::Authentication(self.base_url.clone()));
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InventoryError::SessionOpen {
                endpoint: self.base_url.clone(),
                reason: format!("status {status}: {body}"),
            });
        }

        let token: String = response
            .json()
            .await
            .map_err(|e| InventoryError::Decode(format!("session token: {e}")))?;

        debug!(endpoint = %self.base_url, "Session opened");
        Ok(Box::new(RestSession {
            http: Http {
                client: self.client.clone(),
                base_url: self.base_url.clone(),
                token,
            },
        }))
    }
}

/// Authenticated request plumbing shared by sessions and views.
#[derive(Clone)]
struct Http {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl Http {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(SESSION_HEADER, &self.token)
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, InventoryError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InventoryError::remote(operation, "request timed out")
            } else {
                InventoryError::remote(operation, e)
            }
        })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(InventoryError::Authentication(self.base_url.clone()));
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InventoryError::remote(operation, format!("status {status}: {body}")));
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, InventoryError> {
        self.send(operation, request)
            .await?
            .json()
            .await
            .map_err(|e| InventoryError::Decode(format!("{operation}: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, operation: &str, path: &str) -> Result<T, InventoryError> {
        self.json(operation, self.request(reqwest::Method::GET, path)).await
    }

    /// A mutation accepted with an empty body started a task vCenter did not name.
    async fn task(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<TaskHandle, InventoryError> {
        let body = self
            .send(operation, request)
            .await?
            .text()
            .await
            .map_err(|e| InventoryError::Decode(format!("{operation}: {e}")))?;
        if body.trim().is_empty() {
            return Ok(TaskHandle::untracked());
        }
        let response: TaskResponse = serde_json::from_str(&body)
            .map_err(|e| InventoryError::Decode(format!("{operation}: {e}")))?;
        Ok(response.into())
    }

    async fn vms(&self) -> Result<Vec<ManagedEntity>, InventoryError> {
        let summaries: Vec<VmSummary> = self.get("list VMs", "/api/vcenter/vm").await?;
        let placement = self.vm_placement().await?;
        stream::iter(summaries)
            .map(|summary| self.vm_record(summary, &placement))
            .buffered(DETAIL_CONCURRENCY)
            .try_collect()
            .await
    }

    /// VM id → name of the host running it.
    async fn vm_placement(&self) -> Result<HashMap<String, String>, InventoryError> {
        let mut placement = HashMap::new();
        let hosts: Vec<HostSummary> = self.get("list hosts", "/api/vcenter/host").await?;
        for host in hosts {
            let request = self
                .request(reqwest::Method::GET, "/api/vcenter/vm")
                .query(&[("hosts", host.host.as_str())]);
            let vms: Vec<VmSummary> = self.json("list VMs by host", request).await?;
            for vm in vms {
                placement.insert(vm.vm, host.name.clone());
            }
        }
        Ok(placement)
    }

    async fn vm_record(
        &self,
        summary: VmSummary,
        placement: &HashMap<String, String>,
    ) -> Result<ManagedEntity, InventoryError> {
        let info: VmInfo = self
            .get("VM details", &format!("/api/vcenter/vm/{}", summary.vm))
            .await?;
        let power_state = PowerState::from(summary.power_state);
        let identity = if power_state == PowerState::PoweredOn {
            self.guest_identity(&summary.vm).await
        } else {
            GuestIdentity::default()
        };
        let host = placement.get(&summary.vm).cloned().unwrap_or_default();

        Ok(ManagedEntity::VirtualMachine(VmRecord {
            id: summary.vm,
            name: summary.name,
            power_state,
            num_cpu: summary.cpu_count.unwrap_or_default(),
            memory_mb: summary.memory_size_mib.unwrap_or_default(),
            guest_os: info.guest_os.unwrap_or_default(),
            ip_address: identity.ip_address.unwrap_or_default(),
            hostname: identity.host_name.unwrap_or_default(),
            host,
            tools_status: String::new(),
            annotation: String::new(),
            num_disks: info.disks.len() as u32,
            snapshots: None,
        }))
    }

    /// Needs running guest tools; vCenter answers 503 otherwise.
    async fn guest_identity(&self, vm_id: &str) -> GuestIdentity {
        match self
            .get("guest identity", &format!("/api/vcenter/vm/{vm_id}/guest/identity"))
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                debug!(vm_id, error = %e, "Guest identity unavailable");
                GuestIdentity::default()
            }
        }
    }

    async fn hosts(&self) -> Result<Vec<ManagedEntity>, InventoryError> {
        let hosts: Vec<HostSummary> = self.get("list hosts", "/api/vcenter/host").await?;
        Ok(hosts
            .into_iter()
            .map(|host| {
                ManagedEntity::Host(HostRecord {
                    id: host.host,
                    name: host.name,
                    connection_state: camel_case(&host.connection_state),
                    power_state: host.power_state.as_deref().map(camel_case).unwrap_or_default(),
                    hardware: None,
                })
            })
            .collect())
    }

    async fn datastores(&self) -> Result<Vec<ManagedEntity>, InventoryError> {
        let summaries: Vec<DatastoreSummary> = self.get("list datastores", "/api/vcenter/datastore").await?;
        stream::iter(summaries)
            .map(|summary| self.datastore_record(summary))
            .buffered(DETAIL_CONCURRENCY)
            .try_collect()
            .await
    }

    async fn datastore_record(&self, summary: DatastoreSummary) -> Result<ManagedEntity, InventoryError> {
        let info: DatastoreInfo = self
            .get("datastore details", &format!("/api/vcenter/datastore/{}", summary.datastore))
            .await?;
        Ok(ManagedEntity::Datastore(DatastoreRecord {
            id: summary.datastore,
            name: summary.name,
            kind: summary.kind,
            capacity_bytes: summary.capacity.unwrap_or_default(),
            free_bytes: info.free_space.or(summary.free_space).unwrap_or_default(),
            accessible: info.accessible,
        }))
    }

    async fn networks(&self) -> Result<Vec<ManagedEntity>, InventoryError> {
        let networks: Vec<NetworkSummary> = self.get("list networks", "/api/vcenter/network").await?;
        Ok(networks
            .into_iter()
            .map(|net| {
                ManagedEntity::Network(NetworkRecord {
                    id: net.network,
                    name: net.name,
                    accessible: None,
                })
            })
            .collect())
    }
}

/// Asynchronous task endpoints answer `"task-123"` or `{"task_id": "task-123"}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TaskResponse {
    Bare(String),
    Wrapped { task_id: String },
}

impl From<TaskResponse> for TaskHandle {
    fn from(response: TaskResponse) -> Self {
        match response {
            TaskResponse::Bare(task_id) | TaskResponse::Wrapped { task_id } => TaskHandle::new(task_id),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum RestPowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl From<RestPowerState> for PowerState {
    fn from(state: RestPowerState) -> Self {
        match state {
            RestPowerState::PoweredOn => PowerState::PoweredOn,
            RestPowerState::PoweredOff => PowerState::PoweredOff,
            RestPowerState::Suspended => PowerState::Suspended,
        }
    }
}

#[derive(Deserialize)]
struct VmSummary {
    vm: String,
    name: String,
    power_state: RestPowerState,
    #[serde(default)]
    cpu_count: Option<u32>,
    #[serde(default, rename = "memory_size_MiB")]
    memory_size_mib: Option<u64>,
}

#[derive(Deserialize)]
struct VmInfo {
    #[serde(default, rename = "guest_OS")]
    guest_os: Option<String>,
    /// Keyed by device id
    #[serde(default)]
    disks: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct GuestIdentity {
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    host_name: Option<String>,
}

#[derive(Deserialize)]
struct HostSummary {
    host: String,
    name: String,
    connection_state: String,
    #[serde(default)]
    power_state: Option<String>,
}

#[derive(Deserialize)]
struct DatastoreSummary {
    datastore: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    free_space: Option<u64>,
    #[serde(default)]
    capacity: Option<u64>,
}

#[derive(Deserialize)]
struct DatastoreInfo {
    accessible: bool,
    #[serde(default)]
    free_space: Option<u64>,
}

#[derive(Deserialize)]
struct NetworkSummary {
    network: String,
    name: String,
}

/// `POWERED_ON` → `poweredOn`, the spelling the rest of the inventory uses.
fn camel_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, word) in value.split('_').filter(|w| !w.is_empty()).enumerate() {
        let word = word.to_ascii_lowercase();
        let mut chars = word.chars();
        match chars.next() {
            Some(first) if i > 0 => {
                out.push(first.to_ascii_uppercase());
                out.push_str(chars.as_str());
            }
            _ => out.push_str(&word),
        }
    }
    out
}

struct RestSession {
    http: Http,
}

impl RestSession {
    async fn power(&self, vm_id: &str, action: &str) -> Result<TaskHandle, InventoryError> {
        let operation = format!("power {action}");
        let request = self
            .http
            .request(reqwest::Method::POST, &format!("/api/vcenter/vm/{vm_id}/power"))
            .query(&[("action", action)]);
        self.http.task(&operation, request).await
    }

    fn unsupported(&self, operation: &str) -> InventoryError {
        InventoryError::Unsupported {
            operation: operation.to_string(),
            endpoint: self.http.base_url.clone(),
        }
    }
}

#[async_trait]
impl InventorySession for RestSession {
    async fn list_entities(&self, kind: EntityKind) -> Result<Box<dyn EntityView>, InventoryError> {
        Ok(Box::new(RestView {
            http: self.http.clone(),
            kind,
        }))
    }

    async fn triggered_alarms(&self) -> Result<Vec<TriggeredAlarm>, InventoryError> {
        Err(self.unsupported("Triggered alarm listing"))
    }

    async fn power_on(&self, vm_id: &str) -> Result<TaskHandle, InventoryError> {
        self.power(vm_id, "start").await
    }

    async fn power_off(&self, vm_id: &str) -> Result<TaskHandle, InventoryError> {
        self.power(vm_id, "stop").await
    }

    async fn reset(&self, vm_id: &str) -> Result<TaskHandle, InventoryError> {
        self.power(vm_id, "reset").await
    }

    async fn create_snapshot(&self, _vm_id: &str, _spec: SnapshotSpec) -> Result<TaskHandle, InventoryError> {
        Err(self.unsupported("Snapshot creation"))
    }

    async fn close(&self) -> Result<(), InventoryError> {
        let request = self.http.request(reqwest::Method::DELETE, "/api/session");
        self.http.send("close session", request).await?;
        debug!(endpoint = %self.http.base_url, "Session closed");
        Ok(())
    }
}

struct RestView {
    http: Http,
    kind: EntityKind,
}

#[async_trait]
impl EntityView for RestView {
    async fn entries(&self) -> Result<Vec<ManagedEntity>, InventoryError> {
        match self.kind {
            EntityKind::VirtualMachine => self.http.vms().await,
            EntityKind::Host => self.http.hosts().await,
            EntityKind::Datastore => self.http.datastores().await,
            EntityKind::Network => self.http.networks().await,
        }
    }

    async fn release(&self) -> Result<(), InventoryError> {
        Ok(())
    }
}
