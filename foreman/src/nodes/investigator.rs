//! Background investigator: optional pre-planning web research.
//!
//! Runs one search for the user's request and digests the hits for the
//! planner. A missing or failing search tool is not fatal; the planner just
//! gets no investigation context.

use async_trait::async_trait;

use crate::error::AgentError;
use crate::graph::{self, Node, NodeContext};
use crate::llm::ToolChoiceMode;
use crate::message::Message;
use crate::prompts::INVESTIGATOR_PROMPT;
use crate::state::{StateDelta, WorkflowState};

pub struct BackgroundInvestigatorNode;

#[async_trait]
impl Node for BackgroundInvestigatorNode {
    fn name(&self) -> &'static str {
        graph::BACKGROUND_INVESTIGATOR
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &NodeContext,
    ) -> Result<StateDelta, AgentError> {
        let Some(query) = state.current_user_turn().map(|m| m.content.clone()) else {
            return Ok(StateDelta::goto(graph::PLANNER));
        };

        let search = ctx
            .tools
            .call(
                self.name(),
                "web_search",
                serde_json::json!({"query": query, "max_results": 5}),
            )
            .await;
        let hits = match search {
            Ok(content) => content.text,
            Err(e) => {
                tracing::debug!(error = %e, "background search unavailable, skipping");
                return Ok(StateDelta::goto(graph::PLANNER));
            }
        };

        let messages = vec![
            Message::system(INVESTIGATOR_PROMPT),
            Message::user(format!("Request: {query}\n\nSearch results:\n{hits}")),
        ];
        let messages = ctx.shared.fit_prompt(self.name(), state, messages)?;
        let llm = ctx.shared.llm_for(self.name());
        let digest = super::with_cancel(ctx, llm.invoke(&messages, &[], ToolChoiceMode::None))
            .await?
            .content;

        Ok(StateDelta {
            investigation: Some(digest),
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
    use crate::tools::{MockTool, ToolRegistry};

    #[tokio::test]
    async fn digests_search_hits_for_the_planner() {
        let tools = Arc::new(ToolRegistry::new());
        tools.register(Arc::new(MockTool::returning(
            "web_search",
            "1. velocity benchmarks",
        )));
        tools.allow(graph::BACKGROUND_INVESTIGATOR, &["web_search"]);
        let shared = Arc::new(Context::for_tests(
            Arc::new(MockLlm::new(vec![LlmResponse::text(
                "Benchmarks suggest 20-30 points per sprint.",
            )])),
            Arc::new(MockLlm::new(vec![])),
            Arc::clone(&tools),
        ));
        let ctx = NodeContext::new(shared, tools, EventSink::noop(), CancellationToken::new());
        let mut state = WorkflowState::new("t-1");
        state.messages.push(Message::user("analyse sprint 5"));

        let delta = BackgroundInvestigatorNode.run(&state, &ctx).await.unwrap();
        assert_eq!(delta.goto.as_deref(), Some(graph::PLANNER));
        assert!(delta.investigation.unwrap().contains("20-30"));
    }

    #[tokio::test]
    async fn missing_search_tool_skips_quietly() {
        let tools = Arc::new(ToolRegistry::new());
        let shared = Arc::new(Context::for_tests(
            Arc::new(MockLlm::new(vec![])),
            Arc::new(MockLlm::new(vec![])),
            Arc::clone(&tools),
        ));
        let ctx = NodeContext::new(shared, tools, EventSink::noop(), CancellationToken::new());
        let mut state = WorkflowState::new("t-1");
        state.messages.push(Message::user("analyse sprint 5"));

        let delta = BackgroundInvestigatorNode.run(&state, &ctx).await.unwrap();
        assert_eq!(delta.goto.as_deref(), Some(graph::PLANNER));
        assert!(delta.investigation.is_none());
    }
}
