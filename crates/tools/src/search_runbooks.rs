//! Runbook search: semantic retrieval over the operational documentation.
//!
//! Passages come back ranked by similarity and are rendered as one text
//! block, each excerpt headed by its provenance:
//!
//! ```text
//! [Source 1: /runbooks/dr.pdf (page 3)]
//! ...
//!
//! ---
//!
//! [Source 2: /runbooks/certs.md]
//! ...
//! ```
//!
//! Backend failures never escape as errors; the model gets a
//! "Search unavailable" text and can carry on with the live tools.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vcassist_config::RetrievalConfig;
use vcassist_core::error::{RetrievalError, ToolError};
use vcassist_core::retrieval::{PassageIndex, RetrievedPassage};
use vcassist_core::tool::{Tool, ToolResult};

pub const NO_RESULTS: &str = "No relevant content found for this query.";
pub const UNAVAILABLE_PREFIX: &str = "Search unavailable: ";
const DELIMITER: &str = "\n\n---\n\n";

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

pub struct SearchRunbooksTool {
    index: Option<Arc<dyn PassageIndex>>,
    top_k: usize,
    timeout: Duration,
}

impl SearchRunbooksTool {
    pub fn new(index: Arc<dyn PassageIndex>, top_k: usize, timeout: Duration) -> Self {
        Self {
            index: Some(index),
            top_k: top_k.max(1),
            timeout,
        }
    }

    /// A tool that is listed in the catalog but reports every search as
    /// unavailable. Used when no index is configured.
    pub fn unconfigured() -> Self {
        Self {
            index: None,
            top_k: 4,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(index: Option<Arc<dyn PassageIndex>>, config: &RetrievalConfig) -> Self {
        match index {
            Some(index) => Self::new(index, config.top_k, Duration::from_secs(config.timeout_secs)),
            None => Self::unconfigured(),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| RetrievalError::NotConfigured("no runbook index configured".into()))?;

        tokio::time::timeout(self.timeout, index.search(query, self.top_k))
            .await
            .map_err(|_| RetrievalError::Timeout(self.timeout.as_secs()))?
    }
}

/// Render passages in rank order with `[Source i: ...]` headers.
pub fn format_passages(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let page = p
                .page
                .map(|page| format!(" (page {})", page + 1))
                .unwrap_or_default();
            format!("[Source {}: {}{}]\n{}", i + 1, p.source, page, p.text)
        })
        .collect::<Vec<_>>()
        .join(DELIMITER)
}

#[async_trait]
impl Tool for SearchRunbooksTool {
    fn name(&self) -> &str {
        "search_runbooks"
    }

    fn description(&self) -> &str {
        "Search the vCenter operational runbooks, procedures, and documentation. \
         Use this for questions about DR procedures, troubleshooting steps, SLAs, \
         maintenance windows, escalation paths, or any operational guidance. \
         For live vCenter state (power status, resource usage, alarms), use the \
         vCenter tools instead. Input: a natural language query about vCenter \
         operations or procedures."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural language question about vCenter operations or procedures"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: SearchArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        match self.search(&args.query).await {
            Ok(passages) if passages.is_empty() => {
                debug!(query = %args.query, "No runbook passages matched");
                Ok(ToolResult::success(NO_RESULTS))
            }
            Ok(passages) => {
                debug!(query = %args.query, hits = passages.len(), "Runbook search complete");
                Ok(ToolResult::success(format_passages(&passages)))
            }
            Err(e) => {
                warn!(error = %e, "Runbook search failed");
                Ok(ToolResult::reported_error(format!("{UNAVAILABLE_PREFIX}{e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcassist_core::tool::ToolOutcome;
    use vcassist_retrieval::{HashingEmbedder, InMemoryIndex};

    fn passage(source: &str, page: Option<u32>, text: &str) -> RetrievedPassage {
        RetrievedPassage {
            source: source.into(),
            page,
            text: text.into(),
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl PassageIndex for FailingIndex {
        fn name(&self) -> &str {
            "failing"
        }

        async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievedPassage>, RetrievalError> {
            Err(RetrievalError::Search("connection refused".into()))
        }
    }

    struct SlowIndex;

    #[async_trait]
    impl PassageIndex for SlowIndex {
        fn name(&self) -> &str {
            "slow"
        }

        async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievedPassage>, RetrievalError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![])
        }
    }

    async fn lab_index() -> Arc<InMemoryIndex> {
        let index = InMemoryIndex::new(Arc::new(HashingEmbedder::default()));
        index
            .add(passage(
                "/runbooks/dr.pdf",
                Some(2),
                "Disaster recovery failover procedure for the primary site",
            ))
            .await
            .unwrap();
        index
            .add(passage(
                "/runbooks/certs.md",
                None,
                "Rotate vCenter machine SSL certificates yearly",
            ))
            .await
            .unwrap();
        Arc::new(index)
    }

    #[test]
    fn format_uses_one_based_pages_and_delimiter() {
        let text = format_passages(&[
            passage("dr.pdf", Some(0), "Step one"),
            passage("certs.md", None, "Rotate"),
        ]);
        assert_eq!(
            text,
            "[Source 1: dr.pdf (page 1)]\nStep one\n\n---\n\n[Source 2: certs.md]\nRotate"
        );
    }

    #[tokio::test]
    async fn search_returns_formatted_excerpts() {
        let tool = SearchRunbooksTool::new(lab_index().await, 4, Duration::from_secs(5));
        let result = tool
            .execute(serde_json::json!({"query": "disaster recovery failover procedure"}))
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(result.output.starts_with("[Source 1: /runbooks/dr.pdf (page 3)]"));
    }

    #[tokio::test]
    async fn empty_hits_are_distinct_from_failure() {
        let empty = SearchRunbooksTool::new(
            Arc::new(InMemoryIndex::new(Arc::new(HashingEmbedder::default()))),
            4,
            Duration::from_secs(5),
        );
        let failing = SearchRunbooksTool::new(Arc::new(FailingIndex), 4, Duration::from_secs(5));

        let none = empty.execute(serde_json::json!({"query": "anything"})).await.unwrap();
        let down = failing.execute(serde_json::json!({"query": "anything"})).await.unwrap();

        assert_eq!(none.output, NO_RESULTS);
        assert!(none.is_success());
        assert!(down.output.starts_with(UNAVAILABLE_PREFIX));
        assert!(down.output.contains("connection refused"));
        assert_eq!(down.outcome, ToolOutcome::ToolReportedError);
    }

    #[tokio::test]
    async fn unconfigured_index_reports_unavailable() {
        let tool = SearchRunbooksTool::unconfigured();
        let result = tool.execute(serde_json::json!({"query": "sla"})).await.unwrap();
        assert!(result.output.starts_with(UNAVAILABLE_PREFIX));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let tool = SearchRunbooksTool::new(Arc::new(SlowIndex), 4, Duration::from_secs(2));
        let result = tool.execute(serde_json::json!({"query": "sla"})).await.unwrap();
        assert!(result.output.contains("timed out"));
    }

    #[tokio::test]
    async fn missing_query_is_invalid() {
        let tool = SearchRunbooksTool::unconfigured();
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
