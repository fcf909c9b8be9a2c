//! Local tools and the per-agent registry.
//!
//! A [`Tool`] is a named, schema-typed callable. The [`ToolRegistry`] stores
//! tools by name with per-agent allow-lists; MCP-served tools are bridged in
//! via [`SourceTool`]. Every result is passed through the truncator before it
//! becomes Tool-message content.

mod escalate;
mod mock;
mod pm;
mod registry;
mod source_adapter;
mod truncate;
mod web;

pub use escalate::{EscalateToPlanner, ESCALATE_TOOL_NAME};
pub use mock::{MockTool, MockToolSource};
pub use pm::{split_project_id, BackendApiCall, GetCurrentProject, PmBridge, ResolveProjectKey};
pub use registry::ToolRegistry;
pub use source_adapter::{register_source, SourceTool};
pub use truncate::truncate_tool_output;
pub use web::{CrawlTool, WebSearchTool};

use async_trait::async_trait;
use serde_json::Value;

use crate::tool_source::{ToolCallContent, ToolSourceError, ToolSpec};

/// A single callable tool exposed to the LLM.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    /// Name, description, and JSON input schema shown to the model.
    fn spec(&self) -> ToolSpec;

    async fn call(&self, args: Value) -> Result<ToolCallContent, ToolSourceError>;
}
