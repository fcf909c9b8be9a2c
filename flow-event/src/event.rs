//! Event types: one variant per wire event, tagged `event` with `data` payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One structured tool call as emitted on the stream.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCallPayload {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One extracted reasoning entry (react agent).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ThoughtPayload {
    pub step_index: usize,
    pub thought: String,
    pub tool_name: String,
}

/// Why a single assistant message ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Cancelled,
}

/// Wire event: serializes to `{"event": "<type>", "data": {...}}`.
///
/// The set is closed; consumers may rely on unknown-event-free streams.
/// Ordering contract per assistant message id: `react_thoughts` (if any)
/// precedes `tool_calls`, which precedes every `tool_call_result`;
/// `finish_reason` is last for that id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    TaskStarted {
        agent: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<usize>,
    },
    TaskCompleted {
        agent: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<usize>,
    },
    MessageChunk {
        agent: String,
        id: String,
        content: String,
    },
    ToolCalls {
        agent: String,
        id: String,
        tool_calls: Vec<ToolCallPayload>,
    },
    ToolCallResult {
        agent: String,
        id: String,
        tool_call_id: String,
        content: String,
    },
    ReactThoughts {
        agent: String,
        id: String,
        thoughts: Vec<ThoughtPayload>,
    },
    StepProgress {
        step_index: usize,
        total_steps: usize,
        step_title: String,
        step_description: String,
    },
    FinishReason {
        id: String,
        reason: FinishReason,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl Event {
    /// Serializes to the `{"event", "data"}` JSON object (no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// The event type tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TaskStarted { .. } => "task_started",
            Event::TaskCompleted { .. } => "task_completed",
            Event::MessageChunk { .. } => "message_chunk",
            Event::ToolCalls { .. } => "tool_calls",
            Event::ToolCallResult { .. } => "tool_call_result",
            Event::ReactThoughts { .. } => "react_thoughts",
            Event::StepProgress { .. } => "step_progress",
            Event::FinishReason { .. } => "finish_reason",
            Event::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag_and_data_payload() {
        let ev = Event::TaskStarted {
            agent: "planner".into(),
            id: "m-1".into(),
            step: Some(0),
        };
        let v = ev.to_value().unwrap();
        assert_eq!(v["event"], "task_started");
        assert_eq!(v["data"]["agent"], "planner");
        assert_eq!(v["data"]["step"], 0);
    }

    #[test]
    fn finish_reason_uses_snake_case() {
        let ev = Event::FinishReason {
            id: "m-1".into(),
            reason: FinishReason::ToolCalls,
        };
        let v = ev.to_value().unwrap();
        assert_eq!(v["data"]["reason"], "tool_calls");
    }

    #[test]
    fn step_is_omitted_when_none() {
        let ev = Event::TaskCompleted {
            agent: "reporter".into(),
            id: "m-9".into(),
            step: None,
        };
        let v = ev.to_value().unwrap();
        assert!(v["data"].get("step").is_none());
    }

    #[test]
    fn kind_matches_wire_tag() {
        let ev = Event::Error {
            kind: "cancelled".into(),
            message: String::new(),
        };
        assert_eq!(ev.kind(), "error");
        assert_eq!(ev.to_value().unwrap()["event"], "error");
    }
}
