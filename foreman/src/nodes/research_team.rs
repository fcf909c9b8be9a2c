//! Research-team router: picks the next pending step and dispatches by type.
//!
//! Never routes to the reporter on normal completion; when every step has a
//! result it hands off to the validator, which owns the terminal decision.
//! A step dispatched three times without gaining a result is declared stuck.

use async_trait::async_trait;
use flow_event::Event;

use crate::error::AgentError;
use crate::graph::{self, Node, NodeContext};
use crate::state::{Observation, ObservationTag, StateDelta, StepType, WorkflowState};

const MAX_STEP_ATTEMPTS: u32 = 3;

pub struct ResearchTeamNode;

#[async_trait]
impl Node for ResearchTeamNode {
    fn name(&self) -> &'static str {
        graph::RESEARCH_TEAM
    }

    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &NodeContext,
    ) -> Result<StateDelta, AgentError> {
        let Some(plan) = &state.current_plan else {
            return Ok(StateDelta::goto(graph::REPORTER).with_observation(
                Observation::error(self.name(), "routing without a plan"),
            ));
        };

        let Some((index, step)) = plan.first_pending() else {
            // All steps complete; the validator makes the terminal call.
            return Ok(StateDelta::goto(graph::VALIDATOR));
        };

        let attempts = if state.last_routed_step == Some(index) {
            state.step_attempts + 1
        } else {
            1
        };
        if attempts > MAX_STEP_ATTEMPTS {
            return Ok(StateDelta::goto(graph::REPORTER).with_observation(
                Observation::tagged(
                    self.name(),
                    format!(
                        "step \"{}\" stuck after {} attempts",
                        step.title, MAX_STEP_ATTEMPTS
                    ),
                    ObservationTag::Stuck,
                ),
            ));
        }

        ctx.events
            .emit(Event::StepProgress {
                step_index: index + 1,
                total_steps: plan.steps.len(),
                step_title: step.title.clone(),
                step_description: step.description.clone(),
            })
            .await;

        let next = match step.step_type {
            StepType::PmQuery => graph::PM_AGENT,
            StepType::Research => graph::RESEARCHER,
            StepType::Processing => graph::CODER,
        };
        Ok(StateDelta {
            step_attempts: Some(attempts),
            last_routed_step: Some(index),
            goto: Some(next.to_string()),
            ..Default::default()
        })
    }
}
