//! `vcassist serve`: expose the tool catalog as an MCP server on stdio.
//!
//! Newline-delimited JSON-RPC 2.0. Handles `initialize`, `ping`,
//! `tools/list` and `tools/call`; notifications are read and dropped.
//! Requests are answered in arrival order. Logs go to stderr, so stdout
//! carries protocol messages only.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use vcassist_core::tool::{ToolCall, ToolRegistry};

use crate::runtime::{Options, Runtime};

/// Newest first; the first entry is offered when the client asks for
/// something else.
const PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
}

pub async fn run(options: Options) -> anyhow::Result<()> {
    let runtime = Runtime::build(options).await?;
    info!(tools = runtime.tools.len(), "Serving MCP on stdio");
    McpServer::new(runtime.tools.clone())
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct Response {
    jsonrpc: &'static str,
    /// Null only when the request could not be parsed
    id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorObject>,
}

#[derive(Debug, Serialize)]
struct ErrorObject {
    code: i32,
    message: String,
}

impl Response {
    fn ok(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(ErrorObject {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Routes MCP requests to a [`ToolRegistry`].
pub struct McpServer {
    tools: Arc<ToolRegistry>,
}

impl McpServer {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    /// Answer requests from `reader` until it closes.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await.context("failed to read request")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(response) = self.handle_line(line).await else {
                continue;
            };

            let mut out = serde_json::to_string(&response).context("failed to encode response")?;
            debug!(raw = %out, "→ send");
            out.push('\n');
            writer.write_all(out.as_bytes()).await.context("failed to write response")?;
            writer.flush().await.context("failed to flush response")?;
        }
        info!("Input closed, MCP server stopping");
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<Response> {
        debug!(raw = %line, "← recv");
        let raw: RawMessage = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Invalid JSON-RPC message");
                return Some(Response::error(None, codes::PARSE_ERROR, format!("Parse error: {e}")));
            }
        };

        match (raw.method, raw.id) {
            (Some(method), Some(id)) => Some(self.handle_request(id, &method, raw.params.unwrap_or_default()).await),
            (Some(method), None) => {
                debug!(%method, "Notification dropped");
                None
            }
            (None, _) => {
                debug!("Message without method dropped");
                None
            }
        }
    }

    async fn handle_request(&self, id: RequestId, method: &str, params: Value) -> Response {
        match method {
            "initialize" => Response::ok(id, initialize(&params)),
            "ping" => Response::ok(id, json!({})),
            "tools/list" => Response::ok(id, self.list_tools()),
            "tools/call" => match serde_json::from_value::<CallParams>(params) {
                Ok(params) => self.call_tool(id, params).await,
                Err(e) => Response::error(Some(id), codes::INVALID_PARAMS, format!("Invalid tools/call params: {e}")),
            },
            other => Response::error(Some(id), codes::METHOD_NOT_FOUND, format!("Method not found: {other}")),
        }
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .list_tools()
            .into_iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "description": d.description,
                    "inputSchema": d.parameters,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, id: RequestId, params: CallParams) -> Response {
        let call = ToolCall {
            id: format!("mcp-{id}"),
            name: params.name,
            arguments: params.arguments,
        };

        match self.tools.invoke(&call).await {
            Ok(result) => {
                debug!(tool = %call.name, success = result.is_success(), "Tool call answered");
                Response::ok(
                    id,
                    json!({
                        "content": [{ "type": "text", "text": result.output }],
                        "isError": !result.is_success(),
                    }),
                )
            }
            Err(e) => Response::error(Some(id), codes::INVALID_PARAMS, e.to_string()),
        }
    }
}

fn initialize(params: &Value) -> Value {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    let version = requested
        .and_then(|v| PROTOCOL_VERSIONS.iter().find(|&&known| known == v))
        .unwrap_or(&PROTOCOL_VERSIONS[0]);

    json!({
        "protocolVersion": version,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": { "name": "vcassist", "version": env!("CARGO_PKG_VERSION") },
    })
}
