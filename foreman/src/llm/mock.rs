//! Scripted LLM for tests: pops queued responses and records every call's
//! prompt size so budget invariants can be asserted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{LlmClient, LlmResponse, ToolChoiceMode};
use crate::error::AgentError;
use crate::message::Message;
use crate::tokens::TokenCounter;
use crate::tool_source::ToolSpec;

/// What the mock saw for one invocation.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub message_count: usize,
    pub prompt_tokens: u32,
    pub tool_names: Vec<String>,
}

pub struct MockLlm {
    responses: Mutex<VecDeque<LlmResponse>>,
    /// Returned when the queue runs dry; `None` makes exhaustion an error.
    fallback: Option<LlmResponse>,
    counter: TokenCounter,
    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockLlm {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            counter: TokenCounter::default(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answers with the same response.
    pub fn repeating(response: LlmResponse) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(response),
            counter: TokenCounter::default(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue first, then fall back to `response` forever.
    pub fn with_fallback(mut self, response: LlmResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Largest prompt (in heuristic tokens) any call carried.
    pub fn max_prompt_tokens(&self) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.prompt_tokens)
            .max()
            .unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        _tool_choice: ToolChoiceMode,
    ) -> Result<LlmResponse, AgentError> {
        self.calls.lock().unwrap().push(RecordedCall {
            message_count: messages.len(),
            prompt_tokens: self.counter.count_messages(messages),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });
        let next = self.responses.lock().unwrap().pop_front();
        match next.or_else(|| self.fallback.clone()) {
            Some(resp) => Ok(resp),
            None => Err(AgentError::LlmFatal("mock response queue exhausted".into())),
        }
    }
}
