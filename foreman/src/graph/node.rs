//! Graph node trait: one step of the workflow.
//!
//! A node reads the shared state and returns a partial update. Nodes never
//! mutate state directly; the driver applies the delta atomically. The
//! context carries the per-request event sink and cancel token plus the
//! shared engine context (config, LLM clients, tool registry).

use async_trait::async_trait;

use super::NodeContext;
use crate::error::AgentError;
use crate::state::{StateDelta, WorkflowState};

#[async_trait]
pub trait Node: Send + Sync {
    /// Node name; must match one of the routing constants.
    fn name(&self) -> &'static str;

    /// One step: read state, return a partial update (including `goto`).
    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &NodeContext,
    ) -> Result<StateDelta, AgentError>;
}
