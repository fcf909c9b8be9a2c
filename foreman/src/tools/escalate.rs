//! Reserved escalation tool.
//!
//! Always bound to the react agent: calling it is the structured signal that
//! the task needs the full planning pipeline. The react node intercepts the
//! call by name before dispatch; this implementation only exists so the tool
//! is well-formed if invoked directly.

use async_trait::async_trait;
use serde_json::Value;

use super::Tool;
use crate::tool_source::{ToolCallContent, ToolSourceError, ToolSpec};

pub const ESCALATE_TOOL_NAME: &str = "escalate_to_planner";

#[derive(Default)]
pub struct EscalateToPlanner;

#[async_trait]
impl Tool for EscalateToPlanner {
    fn name(&self) -> &str {
        ESCALATE_TOOL_NAME
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: ESCALATE_TOOL_NAME.into(),
            description: Some(
                "Hand the task to the planning pipeline when it needs multiple \
                 coordinated steps. Provide a short reason."
                    .into(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"reason": {"type": "string"}},
                "required": ["reason"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<ToolCallContent, ToolSourceError> {
        let reason = args
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("unspecified");
        Ok(ToolCallContent {
            text: format!("escalating to planner: {reason}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_the_reason() {
        let out = EscalateToPlanner
            .call(serde_json::json!({"reason": "needs multi-step analysis"}))
            .await
            .unwrap();
        assert!(out.text.contains("needs multi-step analysis"));
    }
}
