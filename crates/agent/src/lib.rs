//! The reasoning/acting loop for vcassist.
//!
//! 1. **Receive** a user message and the conversation so far
//! 2. **Trim** the history to the configured window
//! 3. **Ask the model** with the system directive and the full tool catalog
//! 4. **If tool calls**: dispatch them, fold the results back, go to step 3
//! 5. **If text**: that is the answer
//!
//! The number of model rounds per message is capped.

pub mod assistant;
pub mod directive;
pub mod history;
pub mod loop_runner;

#[cfg(test)]
mod test_helpers;

pub use assistant::Assistant;
pub use history::HistoryWindow;
pub use loop_runner::{AgentError, AgentLoop, LoopOutcome, ToolRound};
