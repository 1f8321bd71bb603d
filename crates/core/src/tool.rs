//! Tool trait: the single calling convention shared by action tools and
//! the retrieval tool.
//!
//! The registry is the dispatch layer: it holds the flat catalog, hands
//! descriptors to the reasoning loop, and routes invocations by name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use crate::error::{DispatchError, ToolError};

/// What the model sees about a tool when deciding whether to call it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name, unique within a catalog
    pub name: String,

    /// Description used by the model for tool selection
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// How a tool invocation ended, from the tool's own point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success,
    ToolReportedError,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    pub outcome: ToolOutcome,

    /// The payload text folded back into the transcript
    pub output: String,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            outcome: ToolOutcome::Success,
            output: output.into(),
        }
    }

    pub fn reported_error(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            outcome: ToolOutcome::ToolReportedError,
            output: output.into(),
        }
    }

    /// Serialize a structured payload as the result text.
    pub fn from_payload(outcome: ToolOutcome, payload: &serde_json::Value) -> Self {
        let output = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        Self {
            call_id: String::new(),
            outcome,
            output,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ToolOutcome::Success
    }

    fn for_call(mut self, call_id: &str) -> Self {
        self.call_id = call_id.to_string();
        self
    }
}

/// The core Tool trait.
///
/// Each tool is registered once in the [`ToolRegistry`] and lives for the
/// whole process.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "list_vms", "search_runbooks").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The flat tool catalog.
///
/// Registration order is preserved, and names must be unique: a collision
/// is a startup-time configuration error rather than a silent replace.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool, rejecting duplicate names.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> std::result::Result<(), DispatchError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(DispatchError::DuplicateTool(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Register every tool in order, stopping at the first collision.
    pub fn register_all(
        &mut self,
        tools: impl IntoIterator<Item = Box<dyn Tool>>,
    ) -> std::result::Result<(), DispatchError> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&i| self.tools[i].as_ref())
    }

    /// Descriptors for every tool, in registration order.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool by name.
    ///
    /// An unknown name is a `DispatchError`. A tool's own `ToolError` is
    /// absorbed into a `ToolReportedError` result so it reaches the model
    /// as text.
    pub async fn invoke(&self, call: &ToolCall) -> std::result::Result<ToolResult, DispatchError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| DispatchError::UnknownTool(call.name.clone()))?;

        let result = match tool.execute(call.arguments.clone()).await {
            Ok(result) => result,
            Err(e) => {
                debug!(tool = %call.name, error = %e, "Tool rejected invocation");
                ToolResult::from_payload(
                    ToolOutcome::ToolReportedError,
                    &serde_json::json!({ "status": "error", "error": e.to_string() }),
                )
            }
        };
        Ok(result.for_call(&call.id))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
