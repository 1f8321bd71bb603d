//! Error types for the vcassist domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; only `DispatchError`
//! is meant to reach the reasoning loop as a typed failure. Everything
//! a tool hits below that boundary is turned into payload text.

use thiserror::Error;

/// The top-level error type for vcassist operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures raised by a tool's own argument handling.
///
/// The registry absorbs these into a `ToolReportedError` result, so the
/// model sees them as text.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Failures of the dispatch layer itself, distinct from anything a tool reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Duplicate tool name in catalog: {0}")]
    DuplicateTool(String),
}

/// Failures talking to the managed inventory system.
#[derive(Debug, Clone, Error)]
pub enum InventoryError {
    #[error("Could not open session to {endpoint}: {reason}")]
    SessionOpen { endpoint: String, reason: String },

    #[error("Authentication rejected by {0}")]
    Authentication(String),

    #[error("Remote call {operation} failed: {reason}")]
    Remote { operation: String, reason: String },

    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout { operation: String, timeout_secs: u64 },

    #[error("Unexpected response from inventory: {0}")]
    Decode(String),

    /// The connected platform has no way to perform this operation.
    #[error("{operation} is not supported by {endpoint}")]
    Unsupported { operation: String, endpoint: String },
}

impl InventoryError {
    pub fn remote(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Remote {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures of the retrieval backend.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Retrieval backend not configured: {0}")]
    NotConfigured(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector search failed: {0}")]
    Search(String),

    #[error("Search timed out after {0}s")]
    Timeout(u64),
}
