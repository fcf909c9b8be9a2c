//! Runtime context injected into nodes.
//!
//! [`Context`] is the shared per-engine value (config, LLM clients, tool
//! registry, token table); [`NodeContext`] adds the per-request event sink and
//! cancel token. No module-level singletons: everything a node needs arrives
//! through these two values.

use std::sync::Arc;

use flow_event::Event;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::context::fit_within;
use crate::error::AgentError;
use crate::graph;
use crate::llm::LlmClient;
use crate::message::Message;
use crate::state::WorkflowState;
use crate::tokens::{self, ModelTable, TokenCounter};
use crate::tools::ToolRegistry;

/// Fan-out sender for stream events. Sends never fail loudly: a closed
/// receiver just means the caller went away.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Event>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Sink that drops everything (receiver closed immediately).
    pub fn noop() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }

    pub async fn emit(&self, event: Event) {
        let _ = self.tx.send(event).await;
    }
}

/// Shared engine context: injected, never global.
#[derive(Clone)]
pub struct Context {
    pub config: EngineConfig,
    pub basic_llm: Arc<dyn LlmClient>,
    pub reasoning_llm: Arc<dyn LlmClient>,
    pub tools: Arc<ToolRegistry>,
    pub counter: TokenCounter,
    pub models: ModelTable,
}

impl Context {
    /// Planner, reflector, and reporter get the reasoning family; everyone
    /// else the basic one.
    pub fn llm_for(&self, agent: &str) -> Arc<dyn LlmClient> {
        match agent {
            graph::PLANNER | graph::REFLECTOR | graph::REPORTER => {
                Arc::clone(&self.reasoning_llm)
            }
            _ => Arc::clone(&self.basic_llm),
        }
    }

    pub fn model_family_for(&self, agent: &str) -> &str {
        match agent {
            graph::PLANNER | graph::REFLECTOR | graph::REPORTER => &self.config.reasoning_model,
            _ => &self.config.basic_model,
        }
    }

    /// The per-call token limit for this agent given the frontend history.
    pub fn effective_limit(&self, agent: &str, state: &WorkflowState) -> u32 {
        let spec = self.models.lookup(self.model_family_for(agent));
        let frontend_tokens = self.counter.count_messages(state.frontend_messages());
        tokens::effective_limit(spec, frontend_tokens, agent)
    }

    /// Compresses a node's prompt messages to the agent's effective limit.
    pub fn fit_prompt(
        &self,
        agent: &str,
        state: &WorkflowState,
        messages: Vec<Message>,
    ) -> Result<Vec<Message>, AgentError> {
        let limit = self.effective_limit(agent, state);
        fit_within(messages, limit, &self.counter)
    }

    /// Context wired to mocks; used by unit and scenario tests.
    pub fn for_tests(
        basic: Arc<dyn LlmClient>,
        reasoning: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            config: EngineConfig::default(),
            basic_llm: basic,
            reasoning_llm: reasoning,
            tools,
            counter: TokenCounter::default(),
            models: ModelTable::builtin().clone(),
        }
    }
}

/// Per-request node context. `tools` is the request's registry overlay
/// (base tools plus request-scoped ones like `get_current_project`).
#[derive(Clone)]
pub struct NodeContext {
    pub shared: Arc<Context>,
    pub tools: Arc<ToolRegistry>,
    pub events: EventSink,
    pub cancel: CancellationToken,
}

impl NodeContext {
    pub fn new(
        shared: Arc<Context>,
        tools: Arc<ToolRegistry>,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared,
            tools,
            events,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, MockLlm};

    fn test_ctx() -> Context {
        Context::for_tests(
            Arc::new(MockLlm::repeating(LlmResponse::text("ok"))),
            Arc::new(MockLlm::repeating(LlmResponse::text("ok"))),
            Arc::new(ToolRegistry::new()),
        )
    }

    #[test]
    fn reasoning_agents_use_the_reasoning_family() {
        let ctx = test_ctx();
        assert_eq!(ctx.model_family_for(graph::REPORTER), "reasoning");
        assert_eq!(ctx.model_family_for(graph::REACT_AGENT), "mid-chat");
    }

    #[test]
    fn effective_limit_shrinks_with_frontend_history() {
        let mut ctx = test_ctx();
        ctx.config.basic_model = "small-chat".into();
        let mut state = WorkflowState::new("t-1");
        for _ in 0..50 {
            state.messages.push(Message::user("x".repeat(800)));
        }
        state.frontend_history_message_count = 50;
        let limit = ctx.effective_limit(graph::VALIDATOR, &state);
        // 50 * ~204 tokens of history eats most of small-chat's window;
        // the validator default (4000) still caps from above.
        assert!(limit <= 4000);
    }

    #[tokio::test]
    async fn noop_sink_swallows_events() {
        let sink = EventSink::noop();
        sink.emit(Event::Error {
            kind: "cancelled".into(),
            message: String::new(),
        })
        .await;
    }
}
