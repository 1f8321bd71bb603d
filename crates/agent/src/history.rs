//! Conversation window: how much of the front end's history reaches the model.
//!
//! Only the most recent turns are sent; older ones stay with the caller.
//!
//! ```
//! use vcassist_agent::HistoryWindow;
//! use vcassist_core::message::Turn;
//!
//! let turns = vec![Turn::user("q1"), Turn::assistant("a1"), Turn::user("q2")];
//! let kept = HistoryWindow::new(2).bounded(&turns);
//! assert_eq!(kept[0].content, "a1");
//! assert_eq!(kept.len(), 2);
//! ```

use vcassist_config::AgentConfig;
use vcassist_core::message::Turn;

/// Keeps the most recent turns of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    max_turns: usize,
}

impl HistoryWindow {
    pub fn new(max_turns: usize) -> Self {
        Self { max_turns }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.max_history)
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// The last `max_turns` turns, oldest first.
    pub fn bounded<'a>(&self, turns: &'a [Turn]) -> &'a [Turn] {
        let start = turns.len().saturating_sub(self.max_turns);
        &turns[start..]
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new(20)
    }
}
