//! Front-door for a conversation: trims history, runs the loop, and never
//! fails outward.

use tracing::warn;
use vcassist_core::message::Conversation;

use crate::history::HistoryWindow;
use crate::loop_runner::AgentLoop;

pub struct Assistant {
    agent: AgentLoop,
    history: HistoryWindow,
}

impl Assistant {
    pub fn new(agent: AgentLoop, history: HistoryWindow) -> Self {
        Self { agent, history }
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    /// Answer `user_message` given the conversation so far.
    ///
    /// Loop failures come back as `Agent error: <message>` text.
    pub async fn respond(&self, conversation: &Conversation, user_message: &str) -> String {
        let history = self.history.bounded(&conversation.turns);
        match self.agent.process(history, user_message).await {
            Ok(outcome) => outcome.answer,
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "Exchange failed");
                format!("Agent error: {e}")
            }
        }
    }

    /// Like [`respond`](Self::respond), then record the exchange.
    pub async fn respond_and_record(&self, conversation: &mut Conversation, user_message: &str) -> String {
        let answer = self.respond(conversation, user_message).await;
        conversation.record_exchange(user_message, answer.clone());
        answer
    }
}
