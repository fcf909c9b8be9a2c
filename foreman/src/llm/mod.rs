//! LLM client abstraction.
//!
//! Nodes depend on a callable that turns messages + tool specs into assistant
//! text and optional tool calls. Implementations: [`MockLlm`] (scripted, for
//! tests) and [`ChatOpenAI`] (any OpenAI-compatible chat-completions endpoint
//! with streaming and tool calls).
//!
//! # Streaming
//!
//! `invoke_stream` accepts an optional `Sender<MessageChunk>`; implementations
//! that stream send content tokens through it as they arrive and still return
//! the complete [`LlmResponse`] at the end. The default implementation calls
//! `invoke` and forwards the full content as one chunk.

mod mock;
mod openai;

pub use mock::{MockLlm, RecordedCall};
pub use openai::ChatOpenAI;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::message::{Message, ToolCall};
use crate::tool_source::ToolSpec;

/// When tools are present: may use (auto), must not (none), must (required).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToolChoiceMode {
    #[default]
    Auto,
    None,
    Required,
}

/// One streamed content token.
#[derive(Clone, Debug)]
pub struct MessageChunk {
    pub content: String,
}

/// Token usage for one call.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Why the model stopped emitting this message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmFinish {
    Stop,
    ToolCalls,
    Length,
}

/// One completed assistant turn.
#[derive(Clone, Debug)]
pub struct LlmResponse {
    pub content: String,
    /// Provider-exposed reasoning, when present.
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<LlmUsage>,
    pub finish: LlmFinish,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reasoning: None,
            tool_calls: vec![],
            usage: None,
            finish: LlmFinish::Stop,
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.finish = LlmFinish::ToolCalls;
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// Chat-completion client: messages + tools in, assistant turn out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        tool_choice: ToolChoiceMode,
    ) -> Result<LlmResponse, AgentError>;

    /// Streaming variant; default sends the whole content as one chunk.
    async fn invoke_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        tool_choice: ToolChoiceMode,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, AgentError> {
        let response = self.invoke(messages, tools, tool_choice).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                let _ = tx
                    .send(MessageChunk {
                        content: response.content.clone(),
                    })
                    .await;
            }
        }
        Ok(response)
    }
}
