//! Reporter: streams the final answer. Exactly one invocation per request.
//!
//! Fast-path runs already carry the react agent's final answer; it is
//! re-streamed verbatim without another LLM round-trip. Pipeline runs get an
//! LLM synthesis over the plan, step results, observations, and validation
//! records. If the synthesis call itself fails, a deterministic plain-text
//! summary of partial progress is emitted instead; there is no silent
//! failure mode.

use async_trait::async_trait;
use flow_event::{Event, FinishReason};
use tokio::sync::mpsc;

use crate::context::observation_digest;
use crate::error::AgentError;
use crate::graph::{self, Node, NodeContext};
use crate::llm::ToolChoiceMode;
use crate::message::{Message, MessageRole};
use crate::prompts::REPORTER_PROMPT;
use crate::state::{StateDelta, ValidationStatus, WorkflowState};

pub struct ReporterNode;

fn synthesis_context(state: &WorkflowState, ctx: &NodeContext) -> String {
    let mut sections = Vec::new();
    if let Some(user) = state.current_user_turn() {
        sections.push(format!("Request: {}", user.content));
    }
    if let Some(ref plan) = state.current_plan {
        let steps = plan
            .steps
            .iter()
            .map(|s| {
                format!(
                    "### {}\n{}",
                    s.title,
                    s.execution_res.as_deref().unwrap_or("(not executed)")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Plan \"{}\" results:\n{steps}", plan.title));
    }
    if !state.observations.is_empty() {
        sections.push(format!(
            "Observations:\n{}",
            observation_digest(&state.observations, 4_000, &ctx.shared.counter)
        ));
    }
    let uncertainties = state
        .validation_results
        .iter()
        .filter(|r| r.status != ValidationStatus::Success)
        .map(|r| format!("- {}: {}", r.step_title, r.reason))
        .collect::<Vec<_>>()
        .join("\n");
    if !uncertainties.is_empty() {
        sections.push(format!("Residual uncertainties:\n{uncertainties}"));
    }
    if !state.react_thoughts.is_empty() {
        let trace = state
            .react_thoughts
            .iter()
            .map(|t| format!("{}. [{}] {}", t.step_index + 1, t.tool_name, t.thought))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Reasoning trace (for transparency only):\n{trace}"));
    }
    sections.join("\n\n")
}

/// Deterministic fallback when the synthesis LLM call fails.
fn fallback_report(state: &WorkflowState, error: &AgentError) -> String {
    let mut out = String::from("The workflow could not be fully completed.\n");
    out.push_str(&format!("Failure: {}.\n", error.kind()));
    if let Some(ref plan) = state.current_plan {
        out.push_str("\nPartial progress:\n");
        for step in &plan.steps {
            out.push_str(&format!(
                "- {}: {}\n",
                step.title,
                step.execution_res.as_deref().unwrap_or("not executed")
            ));
        }
    }
    for obs in state.observations.iter().rev().take(3) {
        out.push_str(&format!("- [{}] {}\n", obs.agent, obs.content));
    }
    out
}

/// Fast-path answer: the react agent's final assistant message, if any.
fn react_final_answer(state: &WorkflowState) -> Option<String> {
    state
        .messages
        .iter()
        .rev()
        .find(|m| {
            m.role == MessageRole::Assistant
                && m.agent == graph::REACT_AGENT
                && !m.content.is_empty()
                && m.tool_calls.is_empty()
        })
        .map(|m| m.content.clone())
}

#[async_trait]
impl Node for ReporterNode {
    fn name(&self) -> &'static str {
        graph::REPORTER
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &NodeContext,
    ) -> Result<StateDelta, AgentError> {
        let agent = self.name();

        if state.current_plan.is_none() {
            if let Some(answer) = react_final_answer(state) {
                let message_id = format!("msg-{}", uuid::Uuid::new_v4());
                ctx.events
                    .emit(Event::MessageChunk {
                        agent: agent.to_string(),
                        id: message_id.clone(),
                        content: answer,
                    })
                    .await;
                ctx.events
                    .emit(Event::FinishReason {
                        id: message_id,
                        reason: FinishReason::Stop,
                    })
                    .await;
                return Ok(StateDelta::goto(graph::END));
            }
        }

        let messages = ctx.shared.fit_prompt(
            agent,
            state,
            vec![
                Message::system(REPORTER_PROMPT),
                Message::user(synthesis_context(state, ctx)),
            ],
        )?;

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
        let llm = ctx.shared.llm_for(agent);
        let invoke = async {
            let (result, ()) = tokio::join!(
                llm.invoke_stream(&messages, &[], ToolChoiceMode::None, Some(chunk_tx)),
                forward,
            );
            result
        };
        let result = super::with_cancel(ctx, invoke).await;
        if matches!(result, Err(AgentError::Cancelled)) {
            return Err(AgentError::Cancelled);
        }

        let content = match result {
            Ok(response) => response.content,
            Err(e) => {
                tracing::error!(error = %e, "report synthesis failed, using fallback");
                let text = fallback_report(state, &e);
                ctx.events
                    .emit(Event::MessageChunk {
                        agent: agent.to_string(),
                        id: message_id.clone(),
                        content: text.clone(),
                    })
                    .await;
                text
            }
        };

        ctx.events
            .emit(Event::FinishReason {
                id: message_id.clone(),
                reason: FinishReason::Stop,
            })
            .await;
        let mut report = Message::assistant(agent, content);
        report.id = message_id;
        Ok(StateDelta::goto(graph::END).with_message(report))
    }
}
