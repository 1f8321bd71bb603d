//! Managed inventory connectors for vcassist.
//!
//! All connectors implement `vcassist_core::InventoryConnector`. The REST
//! connector talks to a real vCenter; the simulated one runs in-process.
//! [`ScriptedEndpoint`] serves canned HTTP replies for exercising the REST
//! connector without a vCenter.

pub mod fixtures;
pub mod in_memory;
pub mod rest;
pub mod scripted;

pub use in_memory::{Fault, MutationRecord, SessionStats, SimulatedInventory};
pub use rest::RestConnector;
pub use scripted::{RecordedRequest, Reply, RunningEndpoint, ScriptedEndpoint};
