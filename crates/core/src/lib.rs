//! # vcassist core
//!
//! Domain types, traits, and error definitions for the vcassist operations
//! assistant. This crate has no I/O of its own; it defines the contracts
//! every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here: the language model
//! ([`Provider`]), the managed inventory ([`InventoryConnector`]), the
//! runbook index ([`PassageIndex`]) and the tools themselves ([`Tool`]).
//! Implementations live in their own crates, so tests can swap in
//! scripted or simulated versions.

pub mod error;
pub mod event;
pub mod inventory;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{DispatchError, Error, InventoryError, ProviderError, Result, RetrievalError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use inventory::{EntityKind, EntityView, InventoryConnector, InventorySession, ManagedEntity};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role, Turn, TurnRole};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use retrieval::{Embedder, PassageIndex, RetrievedPassage};
pub use tool::{Tool, ToolCall, ToolDescriptor, ToolOutcome, ToolRegistry, ToolResult};
