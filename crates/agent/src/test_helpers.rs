//! Shared test helpers for loop tests.

use std::sync::Mutex;
use vcassist_core::error::ProviderError;
use vcassist_core::message::{Message, MessageToolCall};
use vcassist_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

/// A mock provider that returns a sequence of scripted responses and
/// records every request it receives.
///
/// When the script runs out, the last response is repeated if the provider
/// was built with [`SequentialMockProvider::repeating`]; otherwise it
/// panics.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    repeat_last: bool,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            repeat_last: false,
        }
    }

    /// Returns `response` on every call.
    pub fn repeating(response: ProviderResponse) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![response])
        }
    }

    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, answer: &str) -> Self {
        Self::new(vec![make_tool_call_response(tool_calls), make_text_response(answer)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();
        requests.push(request);

        match responses.get(index) {
            Some(response) => Ok(response.clone()),
            None if self.repeat_last && !responses.is_empty() => Ok(responses[responses.len() - 1].clone()),
            None => panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                index,
                responses.len()
            ),
        }
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Create a response that requests tool calls.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut message = Message::assistant("");
    message.tool_calls = tool_calls;
    ProviderResponse {
        message,
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Create a tool call with JSON arguments.
pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

/// Create a tool call with raw (possibly malformed) argument text.
pub fn make_raw_tool_call(id: &str, name: &str, arguments: &str) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}
