//! Tool sources: named, schema-typed tool sets provided by external servers.
//!
//! A `ToolSource` exposes `list_tools` / `call_tool`; the engine treats the
//! server as opaque. [`McpToolSource`] implements the trait over the three
//! supported transports (stdio, HTTP, SSE). Local tools implement
//! [`crate::tools::Tool`] instead and are bridged into the registry.

mod mcp;
mod provider_sync;

pub use mcp::{McpHttpSession, McpStdioSession, McpToolSource, McpTransport};
pub use provider_sync::{
    is_provider_mismatch, ProviderSyncClient, ProviderSyncRequest, ProviderSyncResponse,
    SyncAction,
};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::error::AgentError;

/// Tool descriptor: name, human description, and JSON schema for arguments.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Text result of one tool execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallContent {
    pub text: String,
}

#[derive(Error, Debug)]
pub enum ToolSourceError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("jsonrpc: {0}")]
    JsonRpc(String),
    #[error("remote HTTP {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolSourceError {
    pub fn into_agent_error(self) -> AgentError {
        match self {
            ToolSourceError::Remote { status, message } => {
                AgentError::ToolRemote { status, message }
            }
            ToolSourceError::Timeout(m) => AgentError::ToolTimeout(m),
            ToolSourceError::InvalidArguments(m) | ToolSourceError::UnknownTool(m) => {
                AgentError::ToolValidation(m)
            }
            ToolSourceError::Transport(m) | ToolSourceError::JsonRpc(m) => {
                AgentError::Execution(m)
            }
        }
    }
}

/// A named tool set served by an external process.
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolSourceError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallContent, ToolSourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_defaults_empty_schema() {
        let spec: ToolSpec =
            serde_json::from_str(r#"{"name": "list_sprints"}"#).unwrap();
        assert_eq!(spec.input_schema, serde_json::json!({}));
        assert!(spec.description.is_none());
    }

    #[test]
    fn errors_map_to_agent_taxonomy() {
        let e = ToolSourceError::Remote {
            status: 404,
            message: "not found".into(),
        }
        .into_agent_error();
        assert_eq!(e.kind(), "tool_error_remote");
        let e = ToolSourceError::UnknownTool("frobnicate".into()).into_agent_error();
        assert_eq!(e.kind(), "tool_error_validation");
        let e = ToolSourceError::Timeout("30s".into()).into_agent_error();
        assert_eq!(e.kind(), "tool_timeout");
    }
}
