//! Mock tools and tool sources for tests and demos.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::Tool;
use crate::tool_source::{ToolCallContent, ToolSource, ToolSourceError, ToolSpec};

type Responder = Box<dyn Fn(&Value) -> Result<String, ToolSourceError> + Send + Sync>;

/// A scriptable tool: fixed text, a queue of responses, or a closure.
/// Records every received argument value for assertions.
pub struct MockTool {
    name: String,
    description: String,
    responder: Responder,
    queue: Mutex<VecDeque<Result<String, String>>>,
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockTool {
    /// Always returns `text`.
    pub fn returning(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self::with_fn(name, move |_| Ok(text.clone()))
    }

    /// Pops scripted responses in order; `Err` entries become JsonRpc errors.
    /// When the queue is empty the last behavior is an UnknownTool error.
    pub fn scripted(
        name: impl Into<String>,
        responses: Vec<Result<String, String>>,
    ) -> Self {
        let tool = Self::with_fn(name, |_| {
            Err(ToolSourceError::Transport("script exhausted".into()))
        });
        *tool.queue.lock().unwrap() = responses.into();
        tool
    }

    pub fn with_fn(
        name: impl Into<String>,
        f: impl Fn(&Value) -> Result<String, ToolSourceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: "mock tool".into(),
            responder: Box::new(f),
            queue: Mutex::new(VecDeque::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    async fn call(&self, args: Value) -> Result<ToolCallContent, ToolSourceError> {
        self.calls.lock().unwrap().push(args.clone());
        let scripted = self.queue.lock().unwrap().pop_front();
        let text = match scripted {
            Some(Ok(text)) => text,
            Some(Err(message)) => return Err(ToolSourceError::JsonRpc(message)),
            None => (self.responder)(&args)?,
        };
        Ok(ToolCallContent { text })
    }
}

/// In-memory tool source: fixed specs and canned call results.
#[derive(Default)]
pub struct MockToolSource {
    tools: Vec<(ToolSpec, String)>,
}

impl MockToolSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: impl Into<String>, result: impl Into<String>) -> Self {
        let name = name.into();
        self.tools.push((
            ToolSpec {
                name,
                description: Some("mock source tool".into()),
                input_schema: serde_json::json!({"type": "object"}),
            },
            result.into(),
        ));
        self
    }
}

#[async_trait]
impl ToolSource for MockToolSource {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolSourceError> {
        Ok(self.tools.iter().map(|(s, _)| s.clone()).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        _arguments: Value,
    ) -> Result<ToolCallContent, ToolSourceError> {
        self.tools
            .iter()
            .find(|(s, _)| s.name == name)
            .map(|(_, text)| ToolCallContent { text: text.clone() })
            .ok_or_else(|| ToolSourceError::UnknownTool(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_pop_in_order() {
        let tool = MockTool::scripted(
            "get_sprint_report",
            vec![Err("invalid uuid".into()), Ok("{\"velocity\":25}".into())],
        );
        let err = tool.call(serde_json::json!({"sprint_id": "5"})).await;
        assert!(matches!(err, Err(ToolSourceError::JsonRpc(m)) if m == "invalid uuid"));
        let ok = tool
            .call(serde_json::json!({"sprint_id": "S5-UUID"}))
            .await
            .unwrap();
        assert!(ok.text.contains("25"));
        assert_eq!(tool.call_count(), 2);
    }
}
