//! Bridges a `ToolSource` (MCP server) into the local registry: each remote
//! tool becomes a `Tool` whose `call` forwards to `call_tool`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{Tool, ToolRegistry};
use crate::tool_source::{ToolCallContent, ToolSource, ToolSourceError, ToolSpec};

pub struct SourceTool {
    source: Arc<dyn ToolSource>,
    spec: ToolSpec,
}

impl SourceTool {
    pub fn new(source: Arc<dyn ToolSource>, spec: ToolSpec) -> Self {
        Self { source, spec }
    }
}

#[async_trait]
impl Tool for SourceTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(&self, args: Value) -> Result<ToolCallContent, ToolSourceError> {
        self.source.call_tool(&self.spec.name, args).await
    }
}

/// Lists the source's tools and registers each one. Returns the tool names.
pub async fn register_source(
    registry: &ToolRegistry,
    source: Arc<dyn ToolSource>,
) -> Result<Vec<String>, ToolSourceError> {
    let specs = source.list_tools().await?;
    let mut names = Vec::with_capacity(specs.len());
    for spec in specs {
        names.push(spec.name.clone());
        registry.register(Arc::new(SourceTool::new(Arc::clone(&source), spec)));
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::MockToolSource;

    #[tokio::test]
    async fn register_source_exposes_remote_tools() {
        let registry = ToolRegistry::new();
        let source = Arc::new(
            MockToolSource::new()
                .with_tool("list_sprints", r#"[{"id":"S5-UUID","name":"Sprint 5"}]"#),
        );
        let names = register_source(&registry, source).await.unwrap();
        assert_eq!(names, vec!["list_sprints"]);
        registry.allow("pm_agent", &["list_sprints"]);
        let out = registry
            .call("pm_agent", "list_sprints", serde_json::json!({}))
            .await
            .unwrap();
        assert!(out.text.contains("Sprint 5"));
    }
}
