//! Shared workflow state.
//!
//! One `WorkflowState` flows through the graph per request. The driver owns
//! it exclusively; nodes read it and return [`StateDelta`] partial updates
//! which `apply` merges (scalars last-write-wins, lists appended). State is
//! created by the transport and discarded at stream end.

mod delta;
mod plan;
mod validation;

pub use delta::StateDelta;
pub use plan::{Plan, Step, StepType};
pub use validation::{ValidationRecord, ValidationStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Tag describing what an observation records.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObservationTag {
    Result,
    Error,
    ToolTimeout,
    Cancelled,
    Stuck,
    Exhausted,
    PlannerFailed,
    DeadlineExceeded,
}

/// One accumulated observation: a worker result, an error, or a terminal note.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub agent: String,
    pub content: String,
    pub tag: ObservationTag,
    pub at: DateTime<Utc>,
}

impl Observation {
    pub fn result(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self::tagged(agent, content, ObservationTag::Result)
    }

    pub fn error(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self::tagged(agent, content, ObservationTag::Error)
    }

    pub fn tagged(
        agent: impl Into<String>,
        content: impl Into<String>,
        tag: ObservationTag,
    ) -> Self {
        Self {
            agent: agent.into(),
            content: content.into(),
            tag,
            at: Utc::now(),
        }
    }
}

/// One extracted reasoning entry from the react agent, ordered by step_index.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReactThought {
    pub step_index: usize,
    pub thought: String,
    pub tool_name: String,
}

/// The shared state value. See the field-level notes for merge semantics.
#[derive(Clone, Debug)]
pub struct WorkflowState {
    /// Insertion-ordered conversation. The first
    /// `frontend_history_message_count` entries are the frontend-supplied
    /// history; the rest accumulated during this request.
    pub messages: Vec<Message>,
    pub current_plan: Option<Plan>,
    pub observations: Vec<Observation>,
    pub validation_results: Vec<ValidationRecord>,
    pub reflection: Option<String>,
    pub retry_count: u32,
    pub plan_iterations: u32,
    pub max_replan_iterations: u32,
    pub current_step_index: usize,
    pub total_steps: usize,
    /// Attempts at the step the research-team router last dispatched.
    pub step_attempts: u32,
    pub last_routed_step: Option<usize>,
    pub frontend_history_message_count: usize,
    pub escalation_reason: Option<String>,
    pub previous_result: Option<String>,
    pub react_attempts: u32,
    pub react_thoughts: Vec<ReactThought>,
    /// Routing cursor: name of the next node, or `__end__`.
    pub goto: String,
    pub project_id: Option<String>,
    pub thread_id: String,
    /// Run web research before planning when escalating to the full pipeline.
    pub investigate: bool,
    /// Pre-planning findings from the background investigator.
    pub investigation: Option<String>,
}

impl WorkflowState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            messages: vec![],
            current_plan: None,
            observations: vec![],
            validation_results: vec![],
            reflection: None,
            retry_count: 0,
            plan_iterations: 0,
            max_replan_iterations: 3,
            current_step_index: 0,
            total_steps: 0,
            step_attempts: 0,
            last_routed_step: None,
            frontend_history_message_count: 0,
            escalation_reason: None,
            previous_result: None,
            react_attempts: 0,
            react_thoughts: vec![],
            goto: crate::graph::COORDINATOR.to_string(),
            project_id: None,
            thread_id: thread_id.into(),
            investigate: false,
            investigation: None,
        }
    }

    /// Merges a node's partial update. Lists append; `Some` scalars replace.
    /// `current_step_index` never decreases and never exceeds `total_steps`.
    pub fn apply(&mut self, delta: StateDelta) {
        self.messages.extend(delta.messages);
        self.observations.extend(delta.observations);
        self.validation_results.extend(delta.validation_results);
        self.react_thoughts.extend(delta.react_thoughts);
        if let Some(plan) = delta.current_plan {
            self.current_plan = Some(plan);
        }
        if let Some(r) = delta.reflection {
            self.reflection = Some(r);
        }
        if let Some(v) = delta.retry_count {
            self.retry_count = v;
        }
        if let Some(v) = delta.plan_iterations {
            self.plan_iterations = v;
        }
        if let Some(v) = delta.total_steps {
            self.total_steps = v;
        }
        if let Some(v) = delta.current_step_index {
            let bounded = v.min(self.total_steps);
            self.current_step_index = self.current_step_index.max(bounded);
        }
        if let Some(v) = delta.step_attempts {
            self.step_attempts = v;
        }
        if let Some(v) = delta.last_routed_step {
            self.last_routed_step = Some(v);
        }
        if let Some(v) = delta.escalation_reason {
            self.escalation_reason = Some(v);
        }
        if let Some(v) = delta.previous_result {
            self.previous_result = Some(v);
        }
        if let Some(v) = delta.react_attempts {
            self.react_attempts = v;
        }
        if let Some(v) = delta.investigation {
            self.investigation = Some(v);
        }
        if let Some(v) = delta.goto {
            self.goto = v;
        }
    }

    /// The current (first pending) step of the plan, when one exists.
    pub fn current_step(&self) -> Option<(usize, &Step)> {
        self.current_plan.as_ref().and_then(Plan::first_pending)
    }

    /// Last user message of this request (the current turn).
    pub fn current_user_turn(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::message::MessageRole::User)
    }

    /// State-side messages (everything after the frontend-supplied history).
    pub fn state_messages(&self) -> &[Message] {
        let n = self.frontend_history_message_count.min(self.messages.len());
        &self.messages[n..]
    }

    /// Frontend-supplied history slice.
    pub fn frontend_messages(&self) -> &[Message] {
        let n = self.frontend_history_message_count.min(self.messages.len());
        &self.messages[..n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_appends_lists_and_replaces_scalars() {
        let mut state = WorkflowState::new("t-1");
        state.apply(StateDelta {
            messages: vec![Message::user("hello")],
            reflection: Some("first".into()),
            goto: Some("planner".into()),
            ..Default::default()
        });
        state.apply(StateDelta {
            messages: vec![Message::assistant("planner", "plan ready")],
            reflection: Some("second".into()),
            ..Default::default()
        });
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.reflection.as_deref(), Some("second"));
        assert_eq!(state.goto, "planner");
    }

    #[test]
    fn step_index_is_monotonic_and_bounded() {
        let mut state = WorkflowState::new("t-1");
        state.apply(StateDelta {
            total_steps: Some(3),
            current_step_index: Some(2),
            ..Default::default()
        });
        state.apply(StateDelta {
            current_step_index: Some(1),
            ..Default::default()
        });
        assert_eq!(state.current_step_index, 2);
        state.apply(StateDelta {
            current_step_index: Some(9),
            ..Default::default()
        });
        assert_eq!(state.current_step_index, 3);
    }

    #[test]
    fn state_and_frontend_slices_split_on_history_count() {
        let mut state = WorkflowState::new("t-1");
        state.messages = vec![
            Message::user("old 1"),
            Message::assistant("reporter", "old 2"),
            Message::user("current"),
        ];
        state.frontend_history_message_count = 2;
        assert_eq!(state.frontend_messages().len(), 2);
        assert_eq!(state.state_messages().len(), 1);
        assert_eq!(state.current_user_turn().unwrap().content, "current");
    }
}
