//! React agent: the fast single-loop path.
//!
//! Streams one LLM turn at a time, extracts a thought for every tool call
//! before the call is observed downstream, fans the calls out, and repeats
//! until the model answers without tools. Escalation to the planner fires on
//! any of: the reserved `escalate_to_planner` tool (preferred, structured),
//! the literal request-for-planning phrases (compatibility fallback), the
//! iteration cap, the error budget, a pre-flight context overflow, or a
//! no-tool generic reply to a task.

use async_trait::async_trait;
use flow_event::{Event, FinishReason, ThoughtPayload};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{run_tool_calls, ToolOutcome};
use crate::error::AgentError;
use crate::graph::{self, Node, NodeContext};
use crate::llm::{LlmResponse, ToolChoiceMode};
use crate::message::{Message, ToolCall};
use crate::prompts::REACT_PROMPT;
use crate::state::{ReactThought, StateDelta, WorkflowState};
use crate::tools::ESCALATE_TOOL_NAME;

const ESCALATION_PHRASES: [&str; 4] = [
    "this requires detailed planning",
    "i need to plan",
    "this is a complex task that requires",
    "this requires comprehensive analysis",
];

fn summarize_args(arguments: &Value) -> String {
    match arguments.as_object() {
        Some(obj) if !obj.is_empty() => obj
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "no arguments".to_string(),
    }
}

/// Thought extraction precedence: provider reasoning field, then a
/// `Thought:` prefix in the content, then a synthesized fallback.
fn extract_thought(response: &LlmResponse, call: &ToolCall) -> String {
    if let Some(reasoning) = response.reasoning.as_deref() {
        let reasoning = reasoning.trim();
        if !reasoning.is_empty() {
            return reasoning.to_string();
        }
    }
    let content = response.content.trim();
    if let Some(rest) = content.strip_prefix("Thought:") {
        let thought = rest.trim();
        if !thought.is_empty() {
            return thought.to_string();
        }
    }
    format!(
        "I will use {} with {}",
        call.name,
        summarize_args(&call.arguments)
    )
}

/// Short, generic, data-free: a greeting or refusal rather than an answer.
fn looks_like_generic_reply(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.len() >= 200 || trimmed.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let lower = trimmed.to_lowercase();
    const OPENERS: [&str; 6] = ["hello", "hi ", "hi!", "hey", "greetings", "thanks"];
    const GENERIC: [&str; 5] = [
        "how can i help",
        "i can help",
        "i'm sorry",
        "i cannot",
        "i am unable",
    ];
    OPENERS.iter().any(|o| lower.starts_with(o))
        || GENERIC.iter().any(|g| lower.contains(g))
}

fn error_signature(outcome: &ToolOutcome) -> Option<String> {
    outcome
        .result
        .as_ref()
        .err()
        .map(|e| format!("{}:{}", outcome.call.name, e.kind()))
}

pub struct ReactNode;

impl ReactNode {
    fn escalate(
        &self,
        state: &WorkflowState,
        reason: &str,
        thoughts: Vec<ReactThought>,
        partial: String,
    ) -> StateDelta {
        tracing::info!(reason, attempts = state.react_attempts + 1, "react escalating");
        StateDelta {
            escalation_reason: Some(reason.to_string()),
            previous_result: (!partial.is_empty()).then_some(partial),
            react_attempts: Some(state.react_attempts + 1),
            react_thoughts: thoughts,
            goto: Some(graph::PLANNER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Node for ReactNode {
    fn name(&self) -> &'static str {
        graph::REACT_AGENT
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &NodeContext,
    ) -> Result<StateDelta, AgentError> {
        let agent = self.name();
        let cfg = &ctx.shared.config;
        let llm = ctx.shared.llm_for(agent);
        let tools = ctx.tools.specs_for(agent);

        let mut system = REACT_PROMPT.to_string();
        if let Some(ref project) = state.project_id {
            system.push_str(&format!("\nCurrent project: {project}"));
        }
        let mut convo = vec![Message::system(system)];
        convo.extend(state.messages.iter().cloned());

        let mut thoughts: Vec<ReactThought> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut last_content = String::new();
        let mut used_tools = false;

        for _iteration in 0..cfg.react_max_iterations {
            if ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            // Pre-flight: the scratchpad must fit the adjusted budget.
            let limit = ctx.shared.effective_limit(agent, state);
            if ctx.shared.counter.count_messages(&convo) > limit {
                return Ok(self.escalate(state, "context_budget", thoughts, last_content));
            }

            let message_id = format!("msg-{}", uuid::Uuid::new_v4());
            let (chunk_tx, mut chunk_rx) = mpsc::channel::<crate::llm::MessageChunk>(64);
            let forward = {
                let events = ctx.events.clone();
                let id = message_id.clone();
                async move {
                    while let Some(chunk) = chunk_rx.recv().await {
                        events
                            .emit(Event::MessageChunk {
                                agent: agent.to_string(),
                                id: id.clone(),
                                content: chunk.content,
                            })
                            .await;
                    }
                }
            };
            let invoke = async {
                let (response, ()) = tokio::join!(
                    llm.invoke_stream(&convo, &tools, ToolChoiceMode::Auto, Some(chunk_tx)),
                    forward,
                );
                response
            };
            let response = super::with_cancel(ctx, invoke).await?;
            if !response.content.is_empty() {
                last_content = response.content.clone();
            }

            if response.tool_calls.is_empty() {
                let lower = response.content.to_lowercase();
                if ESCALATION_PHRASES.iter().any(|p| lower.contains(p)) {
                    return Ok(self.escalate(
                        state,
                        "model_requested_planning",
                        thoughts,
                        last_content,
                    ));
                }
                if !used_tools && looks_like_generic_reply(&response.content) {
                    return Ok(self.escalate(
                        state,
                        "no_tool_generic_reply",
                        thoughts,
                        last_content,
                    ));
                }
                let mut reply = Message::assistant(agent, response.content);
                reply.id = message_id.clone();
                if let Some(r) = response.reasoning {
                    reply = reply.with_reasoning(r);
                }
                ctx.events
                    .emit(Event::FinishReason {
                        id: message_id,
                        reason: FinishReason::Stop,
                    })
                    .await;
                return Ok(StateDelta {
                    messages: vec![reply],
                    react_thoughts: thoughts,
                    goto: Some(graph::REPORTER.to_string()),
                    ..Default::default()
                });
            }

            // Structured escape hatch beats phrase matching.
            if let Some(call) = response
                .tool_calls
                .iter()
                .find(|c| c.name == ESCALATE_TOOL_NAME)
            {
                let reason = call
                    .arguments
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("model_requested_planning")
                    .to_string();
                return Ok(self.escalate(state, &reason, thoughts, last_content));
            }

            // Thoughts are extracted and emitted before the calls go out.
            let new_thoughts: Vec<ReactThought> = response
                .tool_calls
                .iter()
                .enumerate()
                .map(|(i, call)| ReactThought {
                    step_index: thoughts.len() + i,
                    thought: extract_thought(&response, call),
                    tool_name: call.name.clone(),
                })
                .collect();
            ctx.events
                .emit(Event::ReactThoughts {
                    agent: agent.to_string(),
                    id: message_id.clone(),
                    thoughts: new_thoughts
                        .iter()
                        .map(|t| ThoughtPayload {
                            step_index: t.step_index,
                            thought: t.thought.clone(),
                            tool_name: t.tool_name.clone(),
                        })
                        .collect(),
                })
                .await;
            thoughts.extend(new_thoughts);

            let mut assistant = Message::assistant_with_tools(
                agent,
                response.content.clone(),
                response.tool_calls.clone(),
            );
            assistant.id = message_id.clone();
            convo.push(assistant);

            let outcomes = run_tool_calls(agent, &message_id, &response.tool_calls, ctx).await?;
            ctx.events
                .emit(Event::FinishReason {
                    id: message_id,
                    reason: FinishReason::ToolCalls,
                })
                .await;

            for outcome in &outcomes {
                convo.push(Message::tool(agent, &outcome.call.id, outcome.content()));
                if let Some(sig) = error_signature(outcome) {
                    errors.push(sig);
                }
            }
            used_tools = true;

            if errors.len() as u32 >= cfg.react_max_errors {
                return Ok(self.escalate(state, "repeated_errors", thoughts, last_content));
            }
        }

        Ok(self.escalate(state, "max_iterations", thoughts, last_content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_response(content: &str) -> LlmResponse {
        LlmResponse::text(content)
    }

    #[test]
    fn thought_prefers_provider_reasoning() {
        let call = ToolCall::new("list_sprints", serde_json::json!({}));
        let resp = text_response("Thought: from content").with_reasoning("from provider");
        assert_eq!(extract_thought(&resp, &call), "from provider");
    }

    #[test]
    fn thought_falls_back_to_content_prefix_then_synthesis() {
        let call = ToolCall::new("list_sprints", serde_json::json!({"project_id": "478"}));
        let resp = text_response("Thought: check the sprint list");
        assert_eq!(extract_thought(&resp, &call), "check the sprint list");
        let bare = text_response("");
        let synthesized = extract_thought(&bare, &call);
        assert!(synthesized.contains("list_sprints"));
        assert!(synthesized.contains("project_id"));
    }

    #[test]
    fn generic_reply_detection() {
        assert!(looks_like_generic_reply("Hello! How can I help you today?"));
        assert!(looks_like_generic_reply("I'm sorry, I cannot do that."));
        assert!(!looks_like_generic_reply(
            "Sprint 5 completed 23 points at a velocity of 25."
        ));
        let long = "a detailed multi-sentence answer ".repeat(10);
        assert!(!looks_like_generic_reply(&long));
    }

    #[test]
    fn escalation_phrases_are_substring_and_case_insensitive() {
        let lower = "This Requires DETAILED planning, unfortunately.".to_lowercase();
        assert!(ESCALATION_PHRASES.iter().any(|p| lower.contains(p)));
    }
}
