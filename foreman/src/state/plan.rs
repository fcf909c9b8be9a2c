//! Typed plan: title, thought, and an ordered step list.
//!
//! Steps execute in order; at most one pending step is "current". A step with
//! `execution_res == None` is pending; a non-null string means completed (the
//! string may encode an error, which the validator inspects).

use serde::{Deserialize, Serialize};

/// What kind of worker a step needs. The wire form matches the planner JSON
/// contract (`RESEARCH` / `PROCESSING` / `PM_QUERY`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum StepType {
    #[serde(rename = "RESEARCH")]
    Research,
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "PM_QUERY")]
    PmQuery,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub title: String,
    pub description: String,
    pub step_type: StepType,
    #[serde(default)]
    pub need_search: bool,
    #[serde(default)]
    pub execution_res: Option<String>,
}

impl Step {
    pub fn is_pending(&self) -> bool {
        self.execution_res.is_none()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub title: String,
    pub thought: String,
    #[serde(default)]
    pub has_enough_context: bool,
    pub steps: Vec<Step>,
}

impl Plan {
    /// First step without a result, with its index.
    pub fn first_pending(&self) -> Option<(usize, &Step)> {
        self.steps.iter().enumerate().find(|(_, s)| s.is_pending())
    }

    pub fn completed_count(&self) -> usize {
        self.steps.iter().filter(|s| !s.is_pending()).count()
    }

    pub fn all_complete(&self) -> bool {
        self.steps.iter().all(|s| !s.is_pending())
    }
}
