//! Planner: produces the typed plan, with JSON repair and escalation context.

use async_trait::async_trait;

use crate::context::observation_digest;
use crate::error::AgentError;
use crate::graph::{self, Node, NodeContext};
use crate::llm::ToolChoiceMode;
use crate::message::Message;
use crate::prompts::PLANNER_PROMPT;
use crate::state::{Observation, ObservationTag, Plan, StateDelta, WorkflowState};

const REPAIR_ATTEMPTS: u32 = 2;

/// Extracts the first JSON object from model output, tolerating code fences
/// and surrounding prose.
fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);
    let start = inner.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in inner[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&inner[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_plan(raw: &str) -> Result<Plan, String> {
    let json = extract_json(raw).ok_or_else(|| "no JSON object in output".to_string())?;
    let plan: Plan = serde_json::from_str(json).map_err(|e| e.to_string())?;
    if plan.steps.is_empty() {
        return Err("plan has no steps".into());
    }
    Ok(plan)
}

fn planning_context(state: &WorkflowState, ctx: &NodeContext) -> String {
    let mut sections = Vec::new();
    if let Some(user) = state.current_user_turn() {
        sections.push(format!("Request: {}", user.content));
    }
    if let Some(ref project) = state.project_id {
        sections.push(format!("Project: {project}"));
    }
    if let Some(ref investigation) = state.investigation {
        sections.push(format!("Background research:\n{investigation}"));
    }
    if let Some(ref reflection) = state.reflection {
        sections.push(format!("Reflection on the previous attempt:\n{reflection}"));
    }
    if let Some(ref plan) = state.current_plan {
        let steps = plan
            .steps
            .iter()
            .map(|s| {
                format!(
                    "- {} [{}]",
                    s.title,
                    s.execution_res.as_deref().unwrap_or("pending")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Previous plan \"{}\":\n{steps}", plan.title));
    }
    if let Some(ref reason) = state.escalation_reason {
        sections.push(format!(
            "The fast single-loop agent escalated after {} attempt(s): {reason}",
            state.react_attempts
        ));
    }
    if let Some(ref previous) = state.previous_result {
        sections.push(format!("Partial result so far:\n{previous}"));
    }
    if !state.validation_results.is_empty() {
        let records = state
            .validation_results
            .iter()
            .rev()
            .take(3)
            .map(|r| format!("- {} -> {:?}: {}", r.step_title, r.status, r.reason))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Recent validations:\n{records}"));
    }
    if !state.observations.is_empty() {
        sections.push(format!(
            "Observations:\n{}",
            observation_digest(&state.observations, 2_000, &ctx.shared.counter)
        ));
    }
    sections.join("\n\n")
}

pub struct PlannerNode;

#[async_trait]
impl Node for PlannerNode {
    fn name(&self) -> &'static str {
        graph::PLANNER
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &NodeContext,
    ) -> Result<StateDelta, AgentError> {
        let llm = ctx.shared.llm_for(self.name());
        let mut messages = vec![
            Message::system(PLANNER_PROMPT),
            Message::user(planning_context(state, ctx)),
        ];
        messages = ctx.shared.fit_prompt(self.name(), state, messages)?;

        let mut last_error = String::new();
        for attempt in 0..=REPAIR_ATTEMPTS {
            if ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let response =
                super::with_cancel(ctx, llm.invoke(&messages, &[], ToolChoiceMode::None)).await?;
            match parse_plan(&response.content) {
                Ok(plan) => {
                    tracing::info!(
                        title = %plan.title,
                        steps = plan.steps.len(),
                        iteration = state.plan_iterations + 1,
                        "plan produced"
                    );
                    return Ok(StateDelta {
                        plan_iterations: Some(state.plan_iterations + 1),
                        current_step_index: Some(0),
                        retry_count: Some(0),
                        step_attempts: Some(0),
                        goto: Some(graph::RESEARCH_TEAM.to_string()),
                        ..Default::default()
                    }
                    .with_plan(plan));
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "plan parse failed");
                    last_error = e.clone();
                    messages.push(Message::assistant(self.name(), response.content));
                    messages.push(Message::user(format!(
                        "That response was not a valid plan ({e}). Respond with only \
                         the JSON object described earlier."
                    )));
                }
            }
        }

        Ok(StateDelta::goto(graph::REPORTER).with_observation(Observation::tagged(
            self.name(),
            format!("planner failed: {last_error}"),
            ObservationTag::PlannerFailed,
        )))
    }
}
