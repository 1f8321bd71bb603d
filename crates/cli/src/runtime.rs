//! Wiring: configuration → connector, runbook index, catalog, assistant.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use vcassist_agent::{AgentLoop, Assistant, HistoryWindow};
use vcassist_config::AppConfig;
use vcassist_core::error::InventoryError;
use vcassist_core::event::{DomainEvent, EventBus};
use vcassist_core::inventory::{InventoryConnector, InventorySession};
use vcassist_core::retrieval::{PassageIndex, RetrievedPassage};
use vcassist_core::tool::ToolRegistry;
use vcassist_inventory::{RestConnector, SimulatedInventory};
use vcassist_retrieval::{HashingEmbedder, InMemoryIndex, PgVectorIndex, ProviderEmbedder};
use vcassist_tools::{SearchRunbooksTool, SessionSettings, build_catalog};

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub simulate: bool,
}

/// Everything a command needs, built once per process.
pub struct Runtime {
    pub config: AppConfig,
    pub connector: Arc<dyn InventoryConnector>,
    pub index: Option<Arc<dyn PassageIndex>>,
    pub tools: Arc<ToolRegistry>,
    pub simulated: bool,
}

impl Runtime {
    pub async fn build(options: Options) -> anyhow::Result<Self> {
        let config = AppConfig::load().context("failed to load configuration")?;
        Self::from_config(config, options).await
    }

    pub async fn from_config(config: AppConfig, options: Options) -> anyhow::Result<Self> {
        let connector: Arc<dyn InventoryConnector>;
        let index: Option<Arc<dyn PassageIndex>>;
        if options.simulate {
            info!("Using simulated lab inventory and runbooks");
            connector = Arc::new(SimulatedInventory::lab());
            index = Some(demo_runbooks().await?);
        } else {
            connector = connector_from_config(&config);
            index = index_from_config(&config);
        }

        let search = SearchRunbooksTool::from_config(index.clone(), &config.retrieval);
        let tools = build_catalog(connector.clone(), SessionSettings::from_config(&config.vcenter), search)
            .context("failed to build tool catalog")?;
        debug!(tools = tools.len(), "Catalog ready");

        Ok(Self {
            config,
            connector,
            index,
            tools: Arc::new(tools),
            simulated: options.simulate,
        })
    }

    /// The assistant, wired to the default model provider.
    pub fn assistant(&self) -> anyhow::Result<Assistant> {
        if !self.config.has_api_key() {
            return Err(anyhow!(
                "no model API key configured: set VCASSIST_API_KEY or OPENAI_API_KEY, \
                 or add api_key to {}",
                AppConfig::config_dir().join("config.toml").display()
            ));
        }

        let router = vcassist_providers::build_from_config(&self.config);
        let provider = router
            .default()
            .ok_or_else(|| anyhow!("default provider '{}' is not configured", router.default_name()))?;

        let bus = Arc::new(EventBus::default());
        spawn_event_logger(&bus);
        let agent = AgentLoop::from_config(provider, self.tools.clone(), &self.config).with_event_bus(bus);
        Ok(Assistant::new(agent, HistoryWindow::from_config(&self.config.agent)))
    }
}

/// Mirror loop events into the debug log.
fn spawn_event_logger(bus: &EventBus) {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match event.as_ref() {
                    DomainEvent::ToolExecuted {
                        tool_name,
                        success,
                        duration_ms,
                        ..
                    } => debug!(event = event.kind(), tool = %tool_name, success, duration_ms),
                    DomainEvent::ResponseGenerated { round, tokens_used, .. } => {
                        debug!(event = event.kind(), round, tokens_used)
                    }
                    other => debug!(event = other.kind(), ?other),
                },
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn connector_from_config(config: &AppConfig) -> Arc<dyn InventoryConnector> {
    if config.vcenter.is_configured() {
        Arc::new(RestConnector::from_config(&config.vcenter))
    } else {
        Arc::new(Unconfigured)
    }
}

fn index_from_config(config: &AppConfig) -> Option<Arc<dyn PassageIndex>> {
    let connection = config.retrieval.connection_string.as_deref()?;
    let router = vcassist_providers::build_from_config(config);
    let provider = router.default()?;

    let embedder = Arc::new(ProviderEmbedder::new(provider, &config.retrieval.embedding_model));
    Some(Arc::new(PgVectorIndex::new(
        connection,
        &config.retrieval.collection,
        embedder,
    )))
}

/// Connector used when no vCenter host is configured. Every session open
/// fails, so action tools report the problem instead of the binary refusing
/// to start.
struct Unconfigured;

#[async_trait]
impl InventoryConnector for Unconfigured {
    fn endpoint(&self) -> &str {
        "unconfigured"
    }

    async fn open_session(&self) -> Result<Box<dyn InventorySession>, InventoryError> {
        Err(InventoryError::SessionOpen {
            endpoint: "unconfigured".into(),
            reason: "vCenter host is not configured (set VCENTER_HOST or [vcenter] host)".into(),
        })
    }
}

/// A handful of runbook excerpts for simulated runs.
async fn demo_runbooks() -> anyhow::Result<Arc<dyn PassageIndex>> {
    let index = InMemoryIndex::new(Arc::new(HashingEmbedder::default()));
    let passages = [
        (
            "runbooks/disaster-recovery.pdf",
            Some(0),
            "Disaster recovery failover: confirm the primary site outage with the on-call lead, \
             then start the recovery plan from the DR vCenter. Target RTO is 4 hours.",
        ),
        (
            "runbooks/disaster-recovery.pdf",
            Some(1),
            "After failover, verify replication status and power on tier-1 VMs first \
             (databases, then application servers, then web front ends).",
        ),
        (
            "runbooks/host-alarms.md",
            None,
            "Host memory usage alarm: check for ballooning and swapping, migrate VMs off the host \
             with vMotion, and open a P3 ticket if usage stays above 90% for 30 minutes.",
        ),
        (
            "runbooks/maintenance.md",
            None,
            "Maintenance windows are Sundays 02:00-06:00 UTC. Snapshot every VM before patching \
             and delete snapshots older than 72 hours.",
        ),
        (
            "runbooks/escalation.md",
            None,
            "Escalation path: on-call engineer, then the virtualization lead, then the \
             infrastructure manager. P1 incidents page all three immediately.",
        ),
    ];

    for (source, page, text) in passages {
        index
            .add(RetrievedPassage {
                source: source.into(),
                page,
                text: text.into(),
            })
            .await
            .context("failed to index demo runbooks")?;
    }
    Ok(Arc::new(index))
}
