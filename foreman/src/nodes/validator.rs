//! Validator: judges the step that just finished and owns all terminal
//! routing on the happy path.
//!
//! Obvious failures (error-shaped results) skip the LLM entirely. One
//! `ValidationRecord` is appended per invocation. Routing: pass → next step
//! or reporter when the plan is done; fail → retry the same step (bounded),
//! else reflector (replan budget permitting), else reporter with an
//! exhausted note.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AgentError;
use crate::graph::{self, Node, NodeContext};
use crate::llm::ToolChoiceMode;
use crate::message::Message;
use crate::prompts::VALIDATOR_PROMPT;
use crate::state::{
    Observation, ObservationTag, StateDelta, ValidationRecord, ValidationStatus, WorkflowState,
};

const MAX_STEP_RETRIES: u32 = 2;

static ERROR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(http[ /]?[45]\d{2}|status\s*[45]\d{2}|invalid uuid)")
        .expect("static pattern compiles")
});

/// Error-shaped results fail without consulting the LLM.
fn heuristic_failure(execution_res: &str) -> Option<String> {
    let trimmed = execution_res.trim();
    if trimmed.is_empty() {
        return Some("empty step result".into());
    }
    if ERROR_PATTERN.is_match(trimmed) {
        return Some("result contains an error status".into());
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.get("error").is_some() {
            return Some("result is a tool error".into());
        }
    }
    None
}

fn parse_judgement(raw: &str, step_title: &str, index: usize) -> ValidationRecord {
    #[derive(serde::Deserialize)]
    struct Judgement {
        status: ValidationStatus,
        reason: String,
        should_retry: bool,
        #[serde(default)]
        suggested_fix: String,
    }
    let start = raw.find('{');
    let end = raw.rfind('}');
    let parsed = match (start, end) {
        (Some(s), Some(e)) if e > s => serde_json::from_str::<Judgement>(&raw[s..=e]).ok(),
        _ => None,
    };
    match parsed {
        Some(j) => ValidationRecord {
            step_title: step_title.to_string(),
            status: j.status,
            reason: j.reason,
            should_retry: j.should_retry,
            suggested_fix: j.suggested_fix,
            at_step_index: index,
        },
        None => ValidationRecord {
            step_title: step_title.to_string(),
            status: ValidationStatus::Failure,
            reason: "validator output was not parseable".into(),
            should_retry: false,
            suggested_fix: String::new(),
            at_step_index: index,
        },
    }
}

pub struct ValidatorNode;

#[async_trait]
impl Node for ValidatorNode {
    fn name(&self) -> &'static str {
        graph::VALIDATOR
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &NodeContext,
    ) -> Result<StateDelta, AgentError> {
        let Some(plan) = &state.current_plan else {
            return Ok(StateDelta::goto(graph::REPORTER));
        };
        // Judge the step the router last dispatched; when everything is
        // already complete (sentinel entry), that is the final step.
        let index = state
            .last_routed_step
            .filter(|i| *i < plan.steps.len())
            .unwrap_or(plan.steps.len().saturating_sub(1));
        let step = &plan.steps[index];
        let execution_res = step.execution_res.clone().unwrap_or_default();

        let record = match heuristic_failure(&execution_res) {
            Some(reason) => ValidationRecord {
                step_title: step.title.clone(),
                status: ValidationStatus::Failure,
                reason,
                should_retry: true,
                suggested_fix: String::new(),
                at_step_index: index,
            },
            None => {
                let messages = ctx.shared.fit_prompt(
                    self.name(),
                    state,
                    vec![
                        Message::system(VALIDATOR_PROMPT),
                        Message::user(format!(
                            "Step: {}\nDescription: {}\n\nResult:\n{}",
                            step.title, step.description, execution_res
                        )),
                    ],
                )?;
                let llm = ctx.shared.llm_for(self.name());
                let response =
                    super::with_cancel(ctx, llm.invoke(&messages, &[], ToolChoiceMode::None))
                        .await?;
                parse_judgement(&response.content, &step.title, index)
            }
        };
        tracing::debug!(
            step = %record.step_title,
            status = ?record.status,
            retry = record.should_retry,
            "step validated"
        );

        let mut delta = StateDelta::default();
        if record.is_pass() {
            delta.goto = Some(if plan.all_complete() {
                graph::REPORTER.to_string()
            } else {
                graph::RESEARCH_TEAM.to_string()
            });
        } else if record.should_retry && state.retry_count < MAX_STEP_RETRIES {
            let mut plan = plan.clone();
            plan.steps[index].execution_res = None;
            delta.current_plan = Some(plan);
            delta.retry_count = Some(state.retry_count + 1);
            delta.goto = Some(graph::RESEARCH_TEAM.to_string());
        } else if state.plan_iterations < state.max_replan_iterations {
            delta.goto = Some(graph::REFLECTOR.to_string());
        } else {
            delta.observations.push(Observation::tagged(
                self.name(),
                format!(
                    "replan budget exhausted after {} iterations; reporting partial results",
                    state.plan_iterations
                ),
                ObservationTag::Exhausted,
            ));
            delta.goto = Some(graph::REPORTER.to_string());
        }
        delta.validation_results.push(record);
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    use crate::graph::{Context, EventSink};
    use crate::llm::{LlmResponse, MockLlm};
    use crate::state::{Plan, Step, StepType};
    use crate::tools::ToolRegistry;

    fn ctx_with(llm: MockLlm) -> NodeContext {
        let tools = Arc::new(ToolRegistry::new());
        let shared = Arc::new(Context::for_tests(
            Arc::new(llm),
            Arc::new(MockLlm::repeating(LlmResponse::text("unused"))),
            Arc::clone(&tools),
        ));
        NodeContext::new(shared, tools, EventSink::noop(), CancellationToken::new())
    }

    fn state_with_results(results: &[Option<&str>]) -> WorkflowState {
        let mut state = WorkflowState::new("t-1");
        state.current_plan = Some(Plan {
            title: "t".into(),
            thought: String::new(),
            has_enough_context: false,
            steps: results
                .iter()
                .enumerate()
                .map(|(i, r)| Step {
                    title: format!("step {i}"),
                    description: String::new(),
                    step_type: StepType::PmQuery,
                    need_search: false,
                    execution_res: r.map(String::from),
                })
                .collect(),
        });
        state.total_steps = results.len();
        state
    }

    #[test]
    fn heuristics_catch_error_shapes() {
        assert!(heuristic_failure("").is_some());
        assert!(heuristic_failure("HTTP 404 not found").is_some());
        assert!(heuristic_failure("error: invalid uuid").is_some());
        assert!(heuristic_failure(r#"{"error": "boom"}"#).is_some());
        assert!(heuristic_failure("velocity 25, completed 23").is_none());
    }

    #[tokio::test]
    async fn heuristic_failure_skips_the_llm() {
        let llm = MockLlm::new(vec![]); // any invoke would error
        let ctx = ctx_with(llm);
        let mut state = state_with_results(&[Some("HTTP 500 internal server error")]);
        state.last_routed_step = Some(0);
        let delta = ValidatorNode.run(&state, &ctx).await.unwrap();
        let record = &delta.validation_results[0];
        assert_eq!(record.status, ValidationStatus::Failure);
        // failure + should_retry=true + retry_count 0 -> re-execute same step
        assert_eq!(delta.goto.as_deref(), Some(graph::RESEARCH_TEAM));
        assert_eq!(delta.retry_count, Some(1));
        let plan = delta.current_plan.unwrap();
        assert!(plan.steps[0].execution_res.is_none());
    }

    #[tokio::test]
    async fn pass_with_pending_steps_continues() {
        let ctx = ctx_with(MockLlm::new(vec![LlmResponse::text(
            r#"{"status":"success","reason":"looks right","should_retry":false,"suggested_fix":""}"#,
        )]));
        let mut state = state_with_results(&[Some("velocity 25"), None]);
        state.last_routed_step = Some(0);
        let delta = ValidatorNode.run(&state, &ctx).await.unwrap();
        assert_eq!(delta.goto.as_deref(), Some(graph::RESEARCH_TEAM));
        assert!(delta.current_plan.is_none());
    }

    #[tokio::test]
    async fn pass_with_all_complete_routes_to_reporter() {
        let ctx = ctx_with(MockLlm::new(vec![LlmResponse::text(
            r#"{"status":"partial","reason":"good enough","should_retry":false,"suggested_fix":""}"#,
        )]));
        let mut state = state_with_results(&[Some("velocity 25")]);
        state.last_routed_step = Some(0);
        let delta = ValidatorNode.run(&state, &ctx).await.unwrap();
        assert_eq!(delta.goto.as_deref(), Some(graph::REPORTER));
    }

    #[tokio::test]
    async fn non_retriable_failure_goes_to_reflector() {
        let ctx = ctx_with(MockLlm::new(vec![LlmResponse::text(
            r#"{"status":"failure","reason":"wrong data","should_retry":false,"suggested_fix":"query the board instead"}"#,
        )]));
        let mut state = state_with_results(&[Some("some output")]);
        state.last_routed_step = Some(0);
        let delta = ValidatorNode.run(&state, &ctx).await.unwrap();
        assert_eq!(delta.goto.as_deref(), Some(graph::REFLECTOR));
    }

    #[tokio::test]
    async fn exhausted_replans_route_to_reporter() {
        let ctx = ctx_with(MockLlm::new(vec![LlmResponse::text(
            r#"{"status":"failure","reason":"still wrong","should_retry":false,"suggested_fix":""}"#,
        )]));
        let mut state = state_with_results(&[Some("some output")]);
        state.last_routed_step = Some(0);
        state.plan_iterations = 3;
        let delta = ValidatorNode.run(&state, &ctx).await.unwrap();
        assert_eq!(delta.goto.as_deref(), Some(graph::REPORTER));
        assert_eq!(delta.observations[0].tag, ObservationTag::Exhausted);
    }

    #[test]
    fn unparseable_judgement_fails_closed() {
        let record = parse_judgement("the step looks good to me", "s", 0);
        assert_eq!(record.status, ValidationStatus::Failure);
        assert!(!record.should_retry);
    }
}
