//! Coordinator: the entry gate.
//!
//! Re-entries from the react agent (escalation) and re-expansion requests go
//! straight to the planner (via the background investigator when the request
//! asked for one). Pure chit-chat is answered inline and the run ends.
//! Everything else takes the fast path: the react agent may escalate itself.

use async_trait::async_trait;
use flow_event::{Event, FinishReason};

use crate::error::AgentError;
use crate::graph::{self, Node, NodeContext};
use crate::llm::ToolChoiceMode;
use crate::message::Message;
use crate::prompts::{COORDINATOR_PROMPT, HANDOFF_MARKER};
use crate::state::{StateDelta, WorkflowState};

pub struct CoordinatorNode;

#[async_trait]
impl Node for CoordinatorNode {
    fn name(&self) -> &'static str {
        graph::COORDINATOR
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &NodeContext,
    ) -> Result<StateDelta, AgentError> {
        if state.escalation_reason.is_some() || state.previous_result.is_some() {
            let next = if state.investigate && state.investigation.is_none() {
                graph::BACKGROUND_INVESTIGATOR
            } else {
                graph::PLANNER
            };
            return Ok(StateDelta::goto(next));
        }

        let mut messages = vec![Message::system(COORDINATOR_PROMPT)];
        messages.extend(state.messages.iter().cloned());
        let messages = ctx.shared.fit_prompt(self.name(), state, messages)?;

        let llm = ctx.shared.llm_for(self.name());
        let response =
            super::with_cancel(ctx, llm.invoke(&messages, &[], ToolChoiceMode::None)).await?;

        if response.content.contains(HANDOFF_MARKER) {
            return Ok(StateDelta::goto(graph::REACT_AGENT));
        }

        // Chit-chat: reply inline and end without entering the pipeline.
        let reply = Message::assistant(self.name(), response.content.clone());
        ctx.events
            .emit(Event::MessageChunk {
                agent: self.name().to_string(),
                id: reply.id.clone(),
                content: response.content,
            })
            .await;
        ctx.events
            .emit(Event::FinishReason {
                id: reply.id.clone(),
                reason: FinishReason::Stop,
            })
            .await;
        Ok(StateDelta::goto(graph::END).with_message(reply))
    }
}
