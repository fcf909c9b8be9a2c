//! Conversation messages: tagged role variants plus structured tool calls.
//!
//! Tool-call ids are stable strings generated by the LLM adapter (or minted
//! here when a provider omits them); matching between an assistant message's
//! `tool_calls` and the subsequent Tool messages is by id, never by position.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role tag for one message.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One structured tool invocation emitted by the LLM.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: format!("call-{}", uuid::Uuid::new_v4()),
            name: name.into(),
            arguments,
        }
    }
}

/// One conversation message. Insertion-ordered inside `WorkflowState::messages`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Provider-supplied reasoning text, when the model exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub id: String,
    pub agent: String,
}

fn next_id() -> String {
    format!("msg-{}", uuid::Uuid::new_v4())
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: None,
            reasoning: None,
            id: next_id(),
            agent: String::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: None,
            reasoning: None,
            id: next_id(),
            agent: String::new(),
        }
    }

    pub fn assistant(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: None,
            reasoning: None,
            id: next_id(),
            agent: agent.into(),
        }
    }

    pub fn assistant_with_tools(
        agent: impl Into<String>,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            tool_calls,
            ..Self::assistant(agent, content)
        }
    }

    /// Tool result referencing the originating call by id.
    pub fn tool(
        agent: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: Some(tool_call_id.into()),
            reasoning: None,
            id: next_id(),
            agent: agent.into(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_role_and_unique_ids() {
        let a = Message::user("hi");
        let b = Message::user("hi");
        assert_eq!(a.role, MessageRole::User);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn tool_message_references_call_id() {
        let call = ToolCall::new("list_sprints", serde_json::json!({"project_id": "p-1"}));
        let msg = Message::tool("pm_agent", &call.id, "[]");
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some(call.id.as_str()));
    }

    #[test]
    fn serde_omits_empty_optionals() {
        let v = serde_json::to_value(Message::assistant("react_agent", "done")).unwrap();
        assert!(v.get("tool_calls").is_none());
        assert!(v.get("tool_call_id").is_none());
        assert!(v.get("reasoning").is_none());
    }
}
