//! Reflector: turns a failed execution into planner context.

use async_trait::async_trait;

use crate::context::observation_digest;
use crate::error::AgentError;
use crate::graph::{self, Node, NodeContext};
use crate::llm::ToolChoiceMode;
use crate::message::Message;
use crate::prompts::REFLECTOR_PROMPT;
use crate::state::{StateDelta, WorkflowState};

pub struct ReflectorNode;

fn failure_context(state: &WorkflowState, ctx: &NodeContext) -> String {
    let mut sections = Vec::new();
    if let Some(ref plan) = state.current_plan {
        let steps = plan
            .steps
            .iter()
            .map(|s| {
                format!(
                    "- {}: {}",
                    s.title,
                    s.execution_res.as_deref().unwrap_or("pending")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Plan \"{}\":\n{steps}", plan.title));
    }
    let failures = state
        .validation_results
        .iter()
        .rev()
        .take(5)
        .map(|r| {
            format!(
                "- {} -> {:?}: {} (fix: {})",
                r.step_title, r.status, r.reason, r.suggested_fix
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    if !failures.is_empty() {
        sections.push(format!("Validation records:\n{failures}"));
    }
    if !state.observations.is_empty() {
        sections.push(format!(
            "Observations:\n{}",
            observation_digest(&state.observations, 2_000, &ctx.shared.counter)
        ));
    }
    sections.join("\n\n")
}

#[async_trait]
impl Node for ReflectorNode {
    fn name(&self) -> &'static str {
        graph::REFLECTOR
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &NodeContext,
    ) -> Result<StateDelta, AgentError> {
        let messages = ctx.shared.fit_prompt(
            self.name(),
            state,
            vec![
                Message::system(REFLECTOR_PROMPT),
                Message::user(failure_context(state, ctx)),
            ],
        )?;
        let llm = ctx.shared.llm_for(self.name());
        let reflection =
            super::with_cancel(ctx, llm.invoke(&messages, &[], ToolChoiceMode::None))
                .await?
                .content;
        tracing::info!(len = reflection.len(), "reflection produced");

        Ok(StateDelta {
            reflection: Some(reflection),
            retry_count: Some(0),
            goto: Some(graph::PLANNER.to_string()),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    use crate::graph::{Context, EventSink};
    use crate::llm::{LlmResponse, MockLlm};
    use crate::state::{ValidationRecord, ValidationStatus};
    use crate::tools::ToolRegistry;

    #[tokio::test]
    async fn produces_reflection_and_resets_retry_count() {
        let tools = Arc::new(ToolRegistry::new());
        let shared = Arc::new(Context::for_tests(
            Arc::new(MockLlm::new(vec![])),
            Arc::new(MockLlm::new(vec![LlmResponse::text(
                "The sprint id was never resolved; resolve it first next time.",
            )])),
            Arc::clone(&tools),
        ));
        let ctx = NodeContext::new(shared, tools, EventSink::noop(), CancellationToken::new());
        let mut state = WorkflowState::new("t-1");
        state.retry_count = 2;
        state.validation_results.push(ValidationRecord {
            step_title: "Fetch sprint".into(),
            status: ValidationStatus::Failure,
            reason: "invalid uuid".into(),
            should_retry: false,
            suggested_fix: "resolve the sprint id".into(),
            at_step_index: 0,
        });

        let delta = ReflectorNode.run(&state, &ctx).await.unwrap();
        assert_eq!(delta.goto.as_deref(), Some(graph::PLANNER));
        assert_eq!(delta.retry_count, Some(0));
        assert!(delta.reflection.unwrap().contains("resolve"));
    }
}
