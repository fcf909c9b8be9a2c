//! Tool registry: name → tool map plus per-agent allow-lists.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use super::Tool;
use crate::tool_source::{ToolCallContent, ToolSourceError, ToolSpec};

/// Registry of all loaded tools. Agents only see the names on their
/// allow-list; dispatch is a map lookup, and unknown names surface as
/// argument-validation errors (they count toward the react error budget).
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
    scopes: DashMap<String, Vec<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Grants `agent` access to the named tools (appended to any prior grant).
    pub fn allow(&self, agent: &str, names: &[&str]) {
        let mut entry = self.scopes.entry(agent.to_string()).or_default();
        for name in names {
            if !entry.iter().any(|n| n == name) {
                entry.push((*name).to_string());
            }
        }
    }

    /// Specs for every tool the agent may call, in grant order.
    pub fn specs_for(&self, agent: &str) -> Vec<ToolSpec> {
        let Some(names) = self.scopes.get(agent) else {
            return vec![];
        };
        names
            .iter()
            .filter_map(|n| self.tools.get(n).map(|t| t.spec()))
            .collect()
    }

    pub fn is_allowed(&self, agent: &str, name: &str) -> bool {
        self.scopes
            .get(agent)
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(false)
    }

    /// Per-request overlay: shares the tool Arcs and copies the scopes, so a
    /// request can add request-scoped tools without touching the base set.
    pub fn clone_contents(&self) -> ToolRegistry {
        let out = ToolRegistry::new();
        for entry in self.tools.iter() {
            out.tools
                .insert(entry.key().clone(), Arc::clone(entry.value()));
        }
        for entry in self.scopes.iter() {
            out.scopes.insert(entry.key().clone(), entry.value().clone());
        }
        out
    }

    /// Dispatches one call on behalf of `agent`.
    pub async fn call(
        &self,
        agent: &str,
        name: &str,
        args: Value,
    ) -> Result<ToolCallContent, ToolSourceError> {
        if !self.is_allowed(agent, name) {
            return Err(ToolSourceError::UnknownTool(format!(
                "{name} is not available to {agent}"
            )));
        }
        let tool = self
            .tools
            .get(name)
            .map(|t| Arc::clone(&t))
            .ok_or_else(|| ToolSourceError::UnknownTool(name.to_string()))?;
        tool.call(args).await
    }
}
