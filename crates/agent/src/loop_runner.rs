//! The reasoning/acting loop.
//!
//! One call to [`AgentLoop::process`] handles one user message:
//!
//! ```text
//! AwaitingModel ──(text only)──────────────► Done
//!      │  ▲
//!      │  └──────────── results folded ───┐
//!      ▼                                  │
//! (tool requests) ──► ExecutingTools ─────┘
//! ```
//!
//! Every model request carries the system directive, the bounded history,
//! the new user turn, everything produced so far in this exchange, and the
//! full tool catalog. Each tool request gets exactly one result message,
//! attributed to the request's call id, before the model is asked again.
//! The number of model rounds is capped; a model that keeps asking for
//! tools ends the exchange with [`AgentError::RoundLimitExceeded`].

use chrono::Utc;
use futures::future::join_all;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use vcassist_config::AppConfig;
use vcassist_core::error::{DispatchError, ProviderError};
use vcassist_core::event::{DomainEvent, EventBus};
use vcassist_core::message::{Message, MessageToolCall, Turn};
use vcassist_core::provider::{Provider, ProviderRequest, ProviderResponse};
use vcassist_core::tool::{ToolCall, ToolDescriptor, ToolOutcome, ToolRegistry, ToolResult};

use crate::directive;

/// Failures that end an exchange without an answer.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("could not complete within the allotted reasoning budget ({max_rounds} rounds)")]
    RoundLimitExceeded { max_rounds: u32 },

    #[error("model request failed: {0}")]
    Model(#[from] ProviderError),

    #[error("model did not answer within {timeout_secs}s")]
    ModelTimeout { timeout_secs: u64 },
}

/// The tool requests of one round and their results, index-aligned.
#[derive(Debug, Clone)]
pub struct ToolRound {
    pub requests: Vec<ToolCall>,
    pub results: Vec<ToolResult>,
}

/// Everything one exchange produced.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The model's final text
    pub answer: String,
    pub rounds: Vec<ToolRound>,
    /// The full working transcript, system directive first
    pub transcript: Vec<Message>,
    /// The user turn and the assistant turn, ready to append to history
    pub new_turns: Vec<Turn>,
}

enum LoopState {
    AwaitingModel { round: u32 },
    ExecutingTools { round: u32, requests: Vec<MessageToolCall> },
    Done { answer: String },
}

pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    tools: Arc<ToolRegistry>,
    directive: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_rounds: u32,
    parallel_tool_calls: bool,
    model_timeout: Duration,
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    /// Create a loop with the directive composed for `tools`.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        let directive = directive::compose(&tools);
        Self {
            provider,
            model: model.into(),
            tools,
            directive,
            temperature: 0.0,
            max_tokens: None,
            max_rounds: 10,
            parallel_tool_calls: false,
            model_timeout: Duration::from_secs(120),
            event_bus: Arc::new(EventBus::default()),
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        Self::new(provider, &config.default_model, tools)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_max_rounds(config.agent.max_rounds)
            .with_parallel_tool_calls(config.agent.parallel_tool_calls)
            .with_model_timeout(Duration::from_secs(config.agent.model_timeout_secs))
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = directive.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Maximum model requests per exchange. At least one.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max.max(1);
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn directive(&self) -> &str {
        &self.directive
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run one exchange to completion.
    ///
    /// `history` is used as given; trimming it is the caller's job.
    pub async fn process(&self, history: &[Turn], user_message: &str) -> Result<LoopOutcome, AgentError> {
        info!(history = history.len(), model = %self.model, "Processing message");

        let mut transcript = Vec::with_capacity(history.len() + 2);
        transcript.push(Message::system(&self.directive));
        transcript.extend(history.iter().map(Message::from));
        transcript.push(Message::user(user_message));

        let catalog = self.tools.list_tools();
        let mut rounds = Vec::new();
        let mut state = LoopState::AwaitingModel { round: 1 };

        loop {
            state = match state {
                LoopState::AwaitingModel { round } => {
                    let response = self.ask_model(&transcript, &catalog, round).await?;
                    let message = response.message;

                    if message.tool_calls.is_empty() {
                        LoopState::Done { answer: message.content }
                    } else if round >= self.max_rounds {
                        warn!(max_rounds = self.max_rounds, "Round limit reached");
                        self.event_bus.publish(DomainEvent::RoundLimitReached {
                            max_rounds: self.max_rounds,
                            timestamp: Utc::now(),
                        });
                        return Err(AgentError::RoundLimitExceeded {
                            max_rounds: self.max_rounds,
                        });
                    } else {
                        let requests = message.tool_calls.clone();
                        transcript.push(message);
                        LoopState::ExecutingTools { round, requests }
                    }
                }

                LoopState::ExecutingTools { round, requests } => {
                    debug!(round, tool_count = requests.len(), "Executing tool calls");
                    let (calls, results) = self.execute_round(&requests).await;

                    for result in &results {
                        transcript.push(Message::tool_result(&result.call_id, &result.output));
                    }
                    rounds.push(ToolRound {
                        requests: calls,
                        results,
                    });
                    LoopState::AwaitingModel { round: round + 1 }
                }

                LoopState::Done { answer } => {
                    info!(rounds = rounds.len(), "Exchange complete");
                    transcript.push(Message::assistant(&answer));
                    return Ok(LoopOutcome {
                        new_turns: vec![Turn::user(user_message), Turn::assistant(&answer)],
                        answer,
                        rounds,
                        transcript,
                    });
                }
            };
        }
    }

    async fn ask_model(
        &self,
        transcript: &[Message],
        catalog: &[ToolDescriptor],
        round: u32,
    ) -> Result<ProviderResponse, AgentError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: transcript.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: catalog.to_vec(),
        };

        debug!(round, messages = transcript.len(), "Requesting model");
        let response = match tokio::time::timeout(self.model_timeout, self.provider.complete(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.report_error("model request", &e.to_string());
                return Err(AgentError::Model(e));
            }
            Err(_) => {
                let err = AgentError::ModelTimeout {
                    timeout_secs: self.model_timeout.as_secs(),
                };
                self.report_error("model request", &err.to_string());
                return Err(err);
            }
        };

        self.event_bus.publish(DomainEvent::ResponseGenerated {
            model: response.model.clone(),
            round,
            tokens_used: response.usage.as_ref().map_or(0, |u| u.total_tokens),
            timestamp: Utc::now(),
        });
        Ok(response)
    }

    /// Execute one round's requests. Results come back in request order,
    /// one per request, whatever happens to the others.
    async fn execute_round(&self, requests: &[MessageToolCall]) -> (Vec<ToolCall>, Vec<ToolResult>) {
        let executed: Vec<(ToolCall, ToolResult)> = if self.parallel_tool_calls {
            join_all(requests.iter().map(|r| self.execute_one(r))).await
        } else {
            let mut executed = Vec::with_capacity(requests.len());
            for request in requests {
                executed.push(self.execute_one(request).await);
            }
            executed
        };
        executed.into_iter().unzip()
    }

    async fn execute_one(&self, request: &MessageToolCall) -> (ToolCall, ToolResult) {
        let started = Instant::now();

        let result = match parse_arguments(&request.arguments) {
            Ok(arguments) => {
                let call = ToolCall {
                    id: request.id.clone(),
                    name: request.name.clone(),
                    arguments,
                };
                let result = match self.tools.invoke(&call).await {
                    Ok(result) => result,
                    Err(e) => self.dispatch_failure(&call, &e),
                };
                (call, result)
            }
            Err(reason) => {
                warn!(tool = %request.name, error = %reason, "Malformed tool arguments");
                let call = ToolCall {
                    id: request.id.clone(),
                    name: request.name.clone(),
                    arguments: Value::String(request.arguments.clone()),
                };
                let payload = json!({
                    "status": "error",
                    "error": format!("Invalid JSON arguments for {}: {reason}", request.name),
                });
                (call, error_result(&request.id, &payload))
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(tool = %request.name, duration_ms, success = result.1.is_success(), "Tool finished");
        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: request.name.clone(),
            success: result.1.is_success(),
            duration_ms,
            timestamp: Utc::now(),
        });
        result
    }

    fn dispatch_failure(&self, call: &ToolCall, error: &DispatchError) -> ToolResult {
        warn!(tool = %call.name, error = %error, "Dispatch failed");
        self.report_error("tool dispatch", &error.to_string());

        let payload = match error {
            DispatchError::UnknownTool(name) => json!({
                "status": "error",
                "error": format!("Tool '{name}' does not exist."),
                "available_tools": self.tools.names(),
            }),
            other => json!({ "status": "error", "error": other.to_string() }),
        };
        error_result(&call.id, &payload)
    }

    fn report_error(&self, context: &str, message: &str) {
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            context: context.to_string(),
            error_message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Model-supplied argument text. Blank means no arguments.
fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw).map_err(|e| e.to_string())
}

fn error_result(call_id: &str, payload: &Value) -> ToolResult {
    let mut result = ToolResult::from_payload(ToolOutcome::ToolReportedError, payload);
    result.call_id = call_id.to_string();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use vcassist_core::error::ToolError;
    use vcassist_core::message::Role;
    use vcassist_core::tool::Tool;
    use vcassist_inventory::SimulatedInventory;
    use vcassist_tools::{SearchRunbooksTool, SessionSettings, build_catalog};

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes its text argument"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("missing text".into()))?;
            Ok(ToolResult::success(text))
        }
    }

    struct SlowTool(u64);

    #[async_trait::async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
            let ms = arguments["ms"].as_u64().unwrap_or(self.0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ToolResult::success(format!("slept {ms}")))
        }
    }

    fn echo_registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        registry.register(Box::new(SlowTool(10))).unwrap();
        Arc::new(registry)
    }

    fn lab_registry(inventory: &SimulatedInventory) -> Arc<ToolRegistry> {
        Arc::new(
            build_catalog(
                Arc::new(inventory.clone()),
                SessionSettings::default(),
                SearchRunbooksTool::unconfigured(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn direct_answer_takes_one_round() {
        let provider = Arc::new(SequentialMockProvider::single_text("All good."));
        let agent = AgentLoop::new(provider.clone(), "mock-model", echo_registry());

        let outcome = agent.process(&[], "status?").await.unwrap();

        assert_eq!(outcome.answer, "All good.");
        assert!(outcome.rounds.is_empty());
        assert_eq!(provider.call_count(), 1);
        assert_eq!(
            outcome.new_turns,
            vec![Turn::user("status?"), Turn::assistant("All good.")]
        );
    }

    #[tokio::test]
    async fn request_carries_directive_history_and_catalog() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let agent = AgentLoop::new(provider.clone(), "mock-model", echo_registry());
        let history = vec![Turn::user("earlier"), Turn::assistant("reply")];

        agent.process(&history, "now").await.unwrap();

        let request = &provider.requests()[0];
        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(request.messages[0].content, agent.directive());
        assert_eq!(request.messages[3].content, "now");
        assert_eq!(request.tools.len(), 2);
    }

    #[tokio::test]
    async fn custom_directive_replaces_the_composed_one() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let agent = AgentLoop::new(provider.clone(), "mock-model", echo_registry())
            .with_directive("Answer in one word.");

        agent.process(&[], "status?").await.unwrap();

        let request = &provider.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, "Answer in one word.");
    }

    #[tokio::test]
    async fn tool_result_is_folded_back_with_its_call_id() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("call_a", "echo", json!({"text": "pong"}))],
            "Echo said pong.",
        ));
        let agent = AgentLoop::new(provider.clone(), "mock-model", echo_registry());

        let outcome = agent.process(&[], "ping").await.unwrap();

        assert_eq!(outcome.answer, "Echo said pong.");
        assert_eq!(outcome.rounds.len(), 1);
        assert_eq!(outcome.rounds[0].results[0].output, "pong");

        let second = &provider.requests()[1];
        let tool_msg = second.messages.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(tool_msg.content, "pong");
    }

    #[tokio::test]
    async fn every_request_in_a_round_gets_a_paired_result() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![
                make_tool_call("c1", "echo", json!({"text": "one"})),
                make_tool_call("c2", "missing_tool", json!({})),
                make_tool_call("c3", "echo", json!({})),
                make_raw_tool_call("c4", "echo", "{not json"),
                make_tool_call("c5", "echo", json!({"text": "five"})),
            ],
            "done",
        ));
        let agent = AgentLoop::new(provider.clone(), "mock-model", echo_registry());

        let outcome = agent.process(&[], "go").await.unwrap();
        let round = &outcome.rounds[0];

        assert_eq!(round.requests.len(), 5);
        assert_eq!(round.results.len(), 5);
        for (request, result) in round.requests.iter().zip(&round.results) {
            assert_eq!(request.id, result.call_id);
        }
        assert!(round.results[0].is_success());
        assert!(round.results[1].output.contains("does not exist"));
        assert!(round.results[1].output.contains("echo"));
        assert!(!round.results[2].is_success());
        assert!(round.results[3].output.contains("Invalid JSON arguments"));
        assert_eq!(round.results[4].output, "five");

        let tool_messages = provider.requests()[1]
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .count();
        assert_eq!(tool_messages, 5);
    }

    #[tokio::test]
    async fn blank_arguments_mean_no_arguments() {
        let inventory = SimulatedInventory::lab();
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_raw_tool_call("c1", "get_inventory_summary", "")],
            "3 VMs.",
        ));
        let agent = AgentLoop::new(provider, "mock-model", lab_registry(&inventory));

        let outcome = agent.process(&[], "how many vms?").await.unwrap();
        assert!(outcome.rounds[0].results[0].output.contains("\"total_vms\": 3"));
    }

    #[tokio::test]
    async fn endless_tool_requests_hit_the_round_limit() {
        let provider = Arc::new(SequentialMockProvider::repeating(make_tool_call_response(vec![
            make_tool_call("c", "echo", json!({"text": "again"})),
        ])));
        let bus = Arc::new(EventBus::new(64));
        let mut events = bus.subscribe();
        let agent = AgentLoop::new(provider.clone(), "mock-model", echo_registry())
            .with_max_rounds(3)
            .with_event_bus(bus);

        let err = agent.process(&[], "loop forever").await.unwrap_err();

        assert!(matches!(err, AgentError::RoundLimitExceeded { max_rounds: 3 }));
        assert!(err.to_string().contains("allotted reasoning budget"));
        assert_eq!(provider.call_count(), 3);

        let mut saw_limit = false;
        while let Ok(event) = events.try_recv() {
            if matches!(*event, DomainEvent::RoundLimitReached { max_rounds: 3, .. }) {
                saw_limit = true;
            }
        }
        assert!(saw_limit);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_round_keeps_request_order() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![
                make_tool_call("long", "slow", json!({"ms": 50})),
                make_tool_call("short", "slow", json!({"ms": 1})),
            ],
            "done",
        ));
        let agent = AgentLoop::new(provider, "mock-model", echo_registry()).with_parallel_tool_calls(true);

        let outcome = agent.process(&[], "go").await.unwrap();
        let ids: Vec<&str> = outcome.rounds[0]
            .results
            .iter()
            .map(|r| r.call_id.as_str())
            .collect();
        assert_eq!(ids, vec!["long", "short"]);
        assert_eq!(outcome.rounds[0].results[0].output, "slept 50");
    }

    #[tokio::test]
    async fn combined_question_uses_both_tool_kinds_in_one_round() {
        let inventory = SimulatedInventory::lab();
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![
                make_tool_call("c1", "get_alarms", json!({})),
                make_tool_call("c2", "search_runbooks", json!({"query": "host memory alarm"})),
            ],
            "esxi-02 has a memory alarm; runbook search is unavailable.",
        ));
        let agent = AgentLoop::new(provider.clone(), "mock-model", lab_registry(&inventory));

        let outcome = agent.process(&[], "esxi-02 is alarming, what do I do?").await.unwrap();

        let round = &outcome.rounds[0];
        assert_eq!(round.results.len(), 2);
        assert!(round.results[0].output.contains("Host memory usage"));
        assert!(round.results[1].output.starts_with("Search unavailable"));
        assert_eq!(provider.call_count(), 2);
        assert_eq!(inventory.stats().sessions_closed, 1);
    }

    #[tokio::test]
    async fn model_failure_is_an_agent_error() {
        struct Broken;

        #[async_trait::async_trait]
        impl Provider for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
                Err(ProviderError::Network("connection reset".into()))
            }
        }

        let agent = AgentLoop::new(Arc::new(Broken), "m", echo_registry());
        let err = agent.process(&[], "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Model(ProviderError::Network(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        struct Stalled;

        #[async_trait::async_trait]
        impl Provider for Stalled {
            fn name(&self) -> &str {
                "stalled"
            }
            async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(make_text_response("late"))
            }
        }

        let agent = AgentLoop::new(Arc::new(Stalled), "m", echo_registry())
            .with_model_timeout(Duration::from_secs(5));
        let err = agent.process(&[], "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::ModelTimeout { timeout_secs: 5 }));
    }
}
