//! OpenAI-compatible chat-completions client with streaming and tool calls.
//!
//! Talks to any endpoint implementing the chat-completions wire contract; no
//! vendor lock. Streaming deltas are merged per the append-only contract:
//! content accumulates, tool calls accumulate by index with argument fragments
//! concatenated and parsed once the stream finishes. A process-wide semaphore
//! bounds concurrent calls; 429/5xx are retried with full-jitter backoff and a
//! silent stream (no chunk for 60s) is retried once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Semaphore};

use super::{LlmClient, LlmFinish, LlmResponse, LlmUsage, MessageChunk, ToolChoiceMode};
use crate::error::AgentError;
use crate::message::{Message, MessageRole, ToolCall};
use crate::tool_source::ToolSpec;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 200;
const CHUNK_IDLE: Duration = Duration::from_secs(60);

pub struct ChatOpenAI {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    semaphore: Arc<Semaphore>,
}

impl ChatOpenAI {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        semaphore: Arc<Semaphore>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            semaphore,
        }
    }

    fn wire_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| match m.role {
                MessageRole::System => json!({"role": "system", "content": m.content}),
                MessageRole::User => json!({"role": "user", "content": m.content}),
                MessageRole::Assistant => {
                    let mut obj = json!({"role": "assistant", "content": m.content});
                    if !m.tool_calls.is_empty() {
                        obj["tool_calls"] = Value::Array(
                            m.tool_calls
                                .iter()
                                .map(|c| {
                                    json!({
                                        "id": c.id,
                                        "type": "function",
                                        "function": {
                                            "name": c.name,
                                            "arguments": c.arguments.to_string(),
                                        }
                                    })
                                })
                                .collect(),
                        );
                    }
                    obj
                }
                MessageRole::Tool => json!({
                    "role": "tool",
                    "content": m.content,
                    "tool_call_id": m.tool_call_id.clone().unwrap_or_default(),
                }),
            })
            .collect()
    }

    fn wire_tools(tools: &[ToolSpec]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description.clone().unwrap_or_default(),
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect()
    }

    fn body(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        tool_choice: ToolChoiceMode,
    ) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": Self::wire_messages(messages),
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(Self::wire_tools(tools));
            body["tool_choice"] = Value::String(
                match tool_choice {
                    ToolChoiceMode::Auto => "auto",
                    ToolChoiceMode::None => "none",
                    ToolChoiceMode::Required => "required",
                }
                .to_string(),
            );
        }
        body
    }

    async fn stream_once(
        &self,
        body: &Value,
        chunk_tx: Option<&mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, AgentError> {
        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::LlmTransient(e.to_string()))?;
        let status = resp.status().as_u16();
        if status == 429 || status >= 500 {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::LlmTransient(format!("HTTP {status}: {text}")));
        }
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::LlmFatal(format!("HTTP {status}: {text}")));
        }

        let mut stream = Box::pin(resp.bytes_stream().eventsource());
        let mut acc = StreamAccumulator::default();
        loop {
            let next = tokio::time::timeout(CHUNK_IDLE, stream.next())
                .await
                .map_err(|_| AgentError::LlmTransient("stream idle for 60s".into()))?;
            let Some(event) = next else {
                break;
            };
            let event = event.map_err(|e| AgentError::LlmTransient(e.to_string()))?;
            if event.data.trim() == "[DONE]" {
                break;
            }
            let chunk: Value = serde_json::from_str(&event.data)
                .map_err(|e| AgentError::LlmFatal(format!("chunk parse: {e}")))?;
            if let Some(delta_content) = acc.feed(&chunk) {
                if let Some(tx) = chunk_tx {
                    let _ = tx
                        .send(MessageChunk {
                            content: delta_content,
                        })
                        .await;
                }
            }
        }
        acc.finish()
    }
}

/// Accumulates streamed deltas into one assistant turn. Content is
/// append-only; tool calls accumulate by index; a delta arriving after
/// finish_reason is dropped.
#[derive(Default)]
struct StreamAccumulator {
    content: String,
    reasoning: String,
    tool_calls: Vec<(Option<String>, Option<String>, String)>, // id, name, args
    finish_reason: Option<String>,
    usage: Option<LlmUsage>,
}

impl StreamAccumulator {
    /// Feeds one chunk; returns any new content delta for forwarding.
    fn feed(&mut self, chunk: &Value) -> Option<String> {
        if let Some(u) = chunk.get("usage").filter(|u| !u.is_null()) {
            self.usage = Some(LlmUsage {
                prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
                total_tokens: u["total_tokens"].as_u64().unwrap_or(0) as u32,
            });
        }
        let choice = chunk.get("choices")?.as_array()?.first()?;
        if self.finish_reason.is_some() {
            return None;
        }
        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.finish_reason = Some(reason.to_string());
        }
        let delta = choice.get("delta")?;
        if let Some(r) = delta.get("reasoning_content").and_then(Value::as_str) {
            self.reasoning.push_str(r);
        }
        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                while self.tool_calls.len() <= index {
                    self.tool_calls.push((None, None, String::new()));
                }
                let slot = &mut self.tool_calls[index];
                if let Some(id) = call.get("id").and_then(Value::as_str) {
                    slot.0 = Some(id.to_string());
                }
                if let Some(f) = call.get("function") {
                    if let Some(name) = f.get("name").and_then(Value::as_str) {
                        slot.1 = Some(name.to_string());
                    }
                    if let Some(args) = f.get("arguments").and_then(Value::as_str) {
                        slot.2.push_str(args);
                    }
                }
            }
        }
        let content = delta.get("content").and_then(Value::as_str)?;
        if content.is_empty() {
            return None;
        }
        self.content.push_str(content);
        Some(content.to_string())
    }

    fn finish(self) -> Result<LlmResponse, AgentError> {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .map(|(id, name, raw_args)| {
                let arguments = serde_json::from_str(&raw_args)
                    .unwrap_or_else(|_| Value::String(raw_args.clone()));
                ToolCall {
                    id: id.unwrap_or_else(|| format!("call-{}", uuid::Uuid::new_v4())),
                    name: name.unwrap_or_default(),
                    arguments,
                }
            })
            .collect::<Vec<_>>();
        let finish = match self.finish_reason.as_deref() {
            Some("tool_calls") => LlmFinish::ToolCalls,
            Some("length") => LlmFinish::Length,
            _ if !tool_calls.is_empty() => LlmFinish::ToolCalls,
            _ => LlmFinish::Stop,
        };
        Ok(LlmResponse {
            content: self.content,
            reasoning: (!self.reasoning.is_empty()).then_some(self.reasoning),
            tool_calls,
            usage: self.usage,
            finish,
        })
    }
}

fn backoff(attempt: u32) -> Duration {
    let ceiling = BACKOFF_BASE_MS * 2u64.pow(attempt);
    Duration::from_millis(fastrand::u64(0..=ceiling))
}

#[async_trait]
impl LlmClient for ChatOpenAI {
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        tool_choice: ToolChoiceMode,
    ) -> Result<LlmResponse, AgentError> {
        self.invoke_stream(messages, tools, tool_choice, None).await
    }

    async fn invoke_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        tool_choice: ToolChoiceMode,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, AgentError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| AgentError::Execution("llm semaphore closed".into()))?;
        let body = self.body(messages, tools, tool_choice);
        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.stream_once(&body, chunk_tx.as_ref()).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_transient() => {
                    tracing::warn!(attempt, error = %e, "llm call failed, retrying");
                    last_err = Some(e);
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(match last_err {
            Some(AgentError::LlmTransient(m)) => {
                AgentError::LlmFatal(format!("exhausted retries: {m}"))
            }
            Some(e) => e,
            None => AgentError::LlmFatal("exhausted retries".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_merges_content_and_tool_calls_by_index() {
        let mut acc = StreamAccumulator::default();
        acc.feed(&json!({"choices": [{"delta": {"content": "Sprint "}}]}));
        acc.feed(&json!({"choices": [{"delta": {"content": "5"}}]}));
        acc.feed(&json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "call-1", "function": {"name": "list_sprints", "arguments": "{\"proj"}}
        ]}}]}));
        acc.feed(&json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "ect_id\":\"478\"}"}}
        ]}}]}));
        acc.feed(&json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}));
        let resp = acc.finish().unwrap();
        assert_eq!(resp.content, "Sprint 5");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].id, "call-1");
        assert_eq!(resp.tool_calls[0].arguments["project_id"], "478");
        assert_eq!(resp.finish, LlmFinish::ToolCalls);
    }

    #[test]
    fn deltas_after_finish_are_dropped() {
        let mut acc = StreamAccumulator::default();
        acc.feed(&json!({"choices": [{"delta": {"content": "done"}, "finish_reason": "stop"}]}));
        acc.feed(&json!({"choices": [{"delta": {"content": " extra"}}]}));
        let resp = acc.finish().unwrap();
        assert_eq!(resp.content, "done");
        assert_eq!(resp.finish, LlmFinish::Stop);
    }

    #[test]
    fn unparseable_arguments_survive_as_raw_string() {
        let mut acc = StreamAccumulator::default();
        acc.feed(&json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "c1", "function": {"name": "t", "arguments": "{not json"}}
        ]}}]}));
        let resp = acc.finish().unwrap();
        assert_eq!(resp.tool_calls[0].arguments, Value::String("{not json".into()));
    }

    #[test]
    fn usage_chunk_is_captured() {
        let mut acc = StreamAccumulator::default();
        acc.feed(&json!({"choices": [], "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}}));
        let resp = acc.finish().unwrap();
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn wire_messages_carry_tool_call_ids() {
        let call = ToolCall {
            id: "call-9".into(),
            name: "get_sprint_report".into(),
            arguments: json!({"sprint_id": "S5-UUID"}),
        };
        let messages = vec![
            Message::assistant_with_tools("react_agent", "", vec![call.clone()]),
            Message::tool("react_agent", "call-9", "{\"velocity\":25}"),
        ];
        let wire = ChatOpenAI::wire_messages(&messages);
        assert_eq!(wire[0]["tool_calls"][0]["id"], "call-9");
        assert_eq!(wire[1]["tool_call_id"], "call-9");
    }
}
