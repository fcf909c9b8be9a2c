//! Worker nodes: pm_agent, researcher, coder.
//!
//! One implementation, three bindings. Each executes the current step with a
//! bounded tool loop and writes `execution_res` into the plan. The pm_agent
//! must touch its tools: a finalized reply with zero tool calls becomes an
//! error result the validator will catch. The coder gets no tools and works
//! from prior observations.

use async_trait::async_trait;

use super::run_tool_calls;
use crate::context::observation_digest;
use crate::error::AgentError;
use crate::graph::{self, Node, NodeContext};
use crate::llm::ToolChoiceMode;
use crate::message::Message;
use crate::prompts::{CODER_PROMPT, PM_AGENT_PROMPT, RESEARCHER_PROMPT};
use crate::state::{StateDelta, WorkflowState};

const MAX_INNER_ITERATIONS: u32 = 5;

pub struct WorkerNode {
    name: &'static str,
    prompt: &'static str,
    uses_tools: bool,
    requires_tools: bool,
}

impl WorkerNode {
    pub fn pm_agent() -> Self {
        Self {
            name: graph::PM_AGENT,
            prompt: PM_AGENT_PROMPT,
            uses_tools: true,
            requires_tools: true,
        }
    }

    pub fn researcher() -> Self {
        Self {
            name: graph::RESEARCHER,
            prompt: RESEARCHER_PROMPT,
            uses_tools: true,
            requires_tools: false,
        }
    }

    pub fn coder() -> Self {
        Self {
            name: graph::CODER,
            prompt: CODER_PROMPT,
            uses_tools: false,
            requires_tools: false,
        }
    }

    fn step_context(&self, state: &WorkflowState, ctx: &NodeContext, step_desc: &str) -> String {
        let mut sections = vec![format!("Step to execute:\n{step_desc}")];
        if let Some(ref project) = state.project_id {
            sections.push(format!("Project: {project}"));
        }
        if !state.observations.is_empty() {
            sections.push(format!(
                "Prior observations:\n{}",
                observation_digest(&state.observations, 3_000, &ctx.shared.counter)
            ));
        }
        sections.join("\n\n")
    }
}

#[async_trait]
impl Node for WorkerNode {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &NodeContext,
    ) -> Result<StateDelta, AgentError> {
        let Some((index, step)) = state.current_step() else {
            return Ok(StateDelta::goto(graph::RESEARCH_TEAM));
        };
        let step_block = format!("{}\n{}", step.title, step.description);
        let llm = ctx.shared.llm_for(self.name);
        let tools = if self.uses_tools {
            ctx.tools.specs_for(self.name)
        } else {
            vec![]
        };

        let mut convo = vec![
            Message::system(self.prompt),
            Message::user(self.step_context(state, ctx, &step_block)),
        ];
        convo = ctx.shared.fit_prompt(self.name, state, convo)?;

        let mut used_tools = false;
        let mut final_content = String::new();
        for _ in 0..MAX_INNER_ITERATIONS {
            if ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let response =
                super::with_cancel(ctx, llm.invoke(&convo, &tools, ToolChoiceMode::Auto)).await?;
            if response.tool_calls.is_empty() {
                final_content = response.content;
                break;
            }
            let message_id = format!("msg-{}", uuid::Uuid::new_v4());
            let mut assistant = Message::assistant_with_tools(
                self.name,
                response.content.clone(),
                response.tool_calls.clone(),
            );
            assistant.id = message_id.clone();
            convo.push(assistant);
            let outcomes =
                run_tool_calls(self.name, &message_id, &response.tool_calls, ctx).await?;
            for outcome in &outcomes {
                convo.push(Message::tool(self.name, &outcome.call.id, outcome.content()));
            }
            used_tools = true;
            final_content = response.content;
        }

        let execution_res = if self.requires_tools && !used_tools {
            serde_json::json!({
                "error": format!("{} finalized without calling any tool", self.name)
            })
            .to_string()
        } else if final_content.is_empty() {
            // Tool loop never settled; surface the last tool context instead
            // of an empty result so the validator sees something concrete.
            convo
                .iter()
                .rev()
                .find(|m| m.role == crate::message::MessageRole::Tool)
                .map(|m| m.content.clone())
                .unwrap_or_default()
        } else {
            final_content
        };

        let mut plan = state
            .current_plan
            .clone()
            .ok_or_else(|| AgentError::Execution("worker invoked without a plan".into()))?;
        plan.steps[index].execution_res = Some(execution_res.clone());
        let completed = plan.completed_count();
        let total = plan.steps.len();

        Ok(StateDelta {
            observations: vec![crate::state::Observation::result(
                self.name,
                format!("step \"{}\": {execution_res}", step.title),
            )],
            current_step_index: Some(completed.min(total.saturating_sub(1))),
            goto: Some(graph::VALIDATOR.to_string()),
            ..Default::default()
        }
        .with_plan(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    use crate::graph::{Context, EventSink};
    use crate::llm::{LlmResponse, MockLlm};
    use crate::message::ToolCall;
    use crate::state::{Plan, Step, StepType};
    use crate::tools::{MockTool, ToolRegistry};

    fn state_with_step(step_type: StepType) -> WorkflowState {
        let mut state = WorkflowState::new("t-1");
        state.current_plan = Some(Plan {
            title: "t".into(),
            thought: String::new(),
            has_enough_context: false,
            steps: vec![Step {
                title: "Fetch sprint".into(),
                description: "Query sprint 5".into(),
                step_type,
                need_search: false,
                execution_res: None,
            }],
        });
        state.total_steps = 1;
        state
    }

    fn ctx_with(llm: MockLlm, tools: Arc<ToolRegistry>) -> NodeContext {
        let shared = Arc::new(Context::for_tests(
            Arc::new(llm),
            Arc::new(MockLlm::repeating(LlmResponse::text("unused"))),
            Arc::clone(&tools),
        ));
        NodeContext::new(shared, tools, EventSink::noop(), CancellationToken::new())
    }

    #[tokio::test]
    async fn pm_agent_runs_tools_and_completes_the_step() {
        let tools = Arc::new(ToolRegistry::new());
        tools.register(Arc::new(MockTool::returning(
            "get_sprint_report",
            r#"{"velocity":25,"completed":23}"#,
        )));
        tools.allow(graph::PM_AGENT, &["get_sprint_report"]);
        let llm = MockLlm::new(vec![
            LlmResponse::text("").with_tool_calls(vec![ToolCall::new(
                "get_sprint_report",
                serde_json::json!({"sprint_id": "S5-UUID"}),
            )]),
            LlmResponse::text("Sprint 5: velocity 25, 23 points completed."),
        ]);
        let ctx = ctx_with(llm, tools);
        let state = state_with_step(StepType::PmQuery);

        let delta = WorkerNode::pm_agent().run(&state, &ctx).await.unwrap();
        assert_eq!(delta.goto.as_deref(), Some(graph::VALIDATOR));
        let plan = delta.current_plan.unwrap();
        let res = plan.steps[0].execution_res.as_deref().unwrap();
        assert!(res.contains("velocity 25"));
    }

    #[tokio::test]
    async fn pm_agent_without_tool_calls_yields_error_result() {
        let tools = Arc::new(ToolRegistry::new());
        let llm = MockLlm::new(vec![LlmResponse::text("I think the sprint went fine.")]);
        let ctx = ctx_with(llm, tools);
        let state = state_with_step(StepType::PmQuery);

        let delta = WorkerNode::pm_agent().run(&state, &ctx).await.unwrap();
        let plan = delta.current_plan.unwrap();
        let res = plan.steps[0].execution_res.as_deref().unwrap();
        assert!(res.contains("error"));
        assert!(res.contains("without calling any tool"));
    }

    #[tokio::test]
    async fn coder_works_without_tools() {
        let tools = Arc::new(ToolRegistry::new());
        let llm = MockLlm::new(vec![LlmResponse::text("Velocity trend: stable at 25.")]);
        let ctx = ctx_with(llm, tools);
        let mut state = state_with_step(StepType::Processing);
        state
            .observations
            .push(crate::state::Observation::result("pm_agent", "velocity 25"));

        let delta = WorkerNode::coder().run(&state, &ctx).await.unwrap();
        let plan = delta.current_plan.unwrap();
        assert_eq!(
            plan.steps[0].execution_res.as_deref(),
            Some("Velocity trend: stable at 25.")
        );
    }
}
