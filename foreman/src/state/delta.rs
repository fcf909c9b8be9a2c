//! Partial state updates returned by nodes.
//!
//! Nodes never mutate `WorkflowState` directly; they return a `StateDelta`
//! which the driver merges: scalar fields are last-write-wins (when `Some`),
//! list fields are appended. `goto` is the routing cursor for the next node.

use crate::message::Message;
use crate::state::{Observation, Plan, ReactThought, ValidationRecord};

#[derive(Debug, Default, Clone)]
pub struct StateDelta {
    pub messages: Vec<Message>,
    pub observations: Vec<Observation>,
    pub validation_results: Vec<ValidationRecord>,
    pub react_thoughts: Vec<ReactThought>,
    pub current_plan: Option<Plan>,
    pub reflection: Option<String>,
    pub retry_count: Option<u32>,
    pub plan_iterations: Option<u32>,
    pub current_step_index: Option<usize>,
    pub total_steps: Option<usize>,
    pub step_attempts: Option<u32>,
    pub last_routed_step: Option<usize>,
    pub escalation_reason: Option<String>,
    pub previous_result: Option<String>,
    pub react_attempts: Option<u32>,
    pub investigation: Option<String>,
    pub goto: Option<String>,
}

impl StateDelta {
    /// Delta that only routes to the given node.
    pub fn goto(node: impl Into<String>) -> Self {
        Self {
            goto: Some(node.into()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_observation(mut self, observation: Observation) -> Self {
        self.observations.push(observation);
        self
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.total_steps = Some(plan.steps.len());
        self.current_plan = Some(plan);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goto_sets_only_the_cursor() {
        let d = StateDelta::goto("planner");
        assert_eq!(d.goto.as_deref(), Some("planner"));
        assert!(d.messages.is_empty());
        assert!(d.current_plan.is_none());
    }

    #[test]
    fn with_plan_sets_total_steps() {
        use crate::state::{Step, StepType};
        let plan = Plan {
            title: "t".into(),
            thought: String::new(),
            has_enough_context: false,
            steps: vec![Step {
                title: "a".into(),
                description: String::new(),
                step_type: StepType::Research,
                need_search: true,
                execution_res: None,
            }],
        };
        let d = StateDelta::goto("research_team").with_plan(plan);
        assert_eq!(d.total_steps, Some(1));
    }
}
