//! Tools the assistant can call.
//!
//! Two kinds share one calling convention:
//!
//! - **Action tools** read or mutate live vCenter state. Each call opens its
//!   own session and closes it before returning (see [`session`]).
//! - **`search_runbooks`** performs semantic search over the operational
//!   runbooks.
//!
//! [`build_catalog`] puts all of them into a single [`ToolRegistry`].

pub mod catalog;
pub mod datastore;
pub mod host;
pub mod network;
pub mod overview;
pub mod search_runbooks;
pub mod session;
pub mod snapshot;
pub mod vm;

pub use catalog::{action_tools, build_catalog};
pub use search_runbooks::SearchRunbooksTool;
pub use session::{ActionTool, InventoryAction, Remote, SessionSettings};

#[doc(no_inline)]
pub use vcassist_core::tool::ToolRegistry;
