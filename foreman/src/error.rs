//! Engine error taxonomy.
//!
//! One enum covers every failure kind a node can surface. The driver inspects
//! `is_transient()` for its retry policy and `kind()` when encoding an error
//! into an observation or an `error` stream event. Non-fatal kinds are steered
//! back through the validate/reflect loop; fatal kinds short-circuit to the
//! reporter, which always produces a user-visible message.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AgentError {
    /// Malformed tool arguments: placeholder values, missing ids, unknown tool
    /// names. Counted toward the react error budget.
    #[error("tool argument validation: {0}")]
    ToolValidation(String),

    /// HTTP error from a tool server. 429/5xx are retried with backoff before
    /// this surfaces; 4xx surface directly.
    #[error("tool remote error (HTTP {status}): {message}")]
    ToolRemote { status: u16, message: String },

    /// Tool exceeded its deadline. Never retried.
    #[error("tool timeout: {0}")]
    ToolTimeout(String),

    /// Retriable LLM failure (429/5xx, idle stream).
    #[error("llm transient: {0}")]
    LlmTransient(String),

    /// Non-retriable LLM failure (auth, quota, response parse).
    #[error("llm fatal: {0}")]
    LlmFatal(String),

    /// Planner output stayed unparseable after repair attempts.
    #[error("plan parse: {0}")]
    PlanParse(String),

    /// Prompt would exceed the model context even after compression.
    #[error("context too large: {0}")]
    ContextTooLarge(String),

    /// The same step failed too many times without progress.
    #[error("stuck step: {0}")]
    StuckStep(String),

    /// Caller aborted the request.
    #[error("cancelled")]
    Cancelled,

    /// Anything else: graph wiring, channel failures, internal invariants.
    #[error("execution failed: {0}")]
    Execution(String),
}

impl AgentError {
    /// Transient errors are retried by the driver (twice, with backoff).
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::LlmTransient(_))
    }

    /// Stable kind tag used in observations and `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::ToolValidation(_) => "tool_error_validation",
            AgentError::ToolRemote { .. } => "tool_error_remote",
            AgentError::ToolTimeout(_) => "tool_timeout",
            AgentError::LlmTransient(_) => "llm_transient",
            AgentError::LlmFatal(_) => "llm_fatal",
            AgentError::PlanParse(_) => "parse_error_plan",
            AgentError::ContextTooLarge(_) => "context_too_large",
            AgentError::StuckStep(_) => "stuck_step",
            AgentError::Cancelled => "cancelled",
            AgentError::Execution(_) => "execution_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_llm_transient_is_retriable() {
        assert!(AgentError::LlmTransient("429".into()).is_transient());
        assert!(!AgentError::LlmFatal("auth".into()).is_transient());
        assert!(!AgentError::ToolTimeout("slow".into()).is_transient());
        assert!(!AgentError::Cancelled.is_transient());
    }

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(
            AgentError::ToolValidation("x".into()).kind(),
            "tool_error_validation"
        );
        assert_eq!(AgentError::Cancelled.kind(), "cancelled");
        assert_eq!(
            AgentError::ContextTooLarge("x".into()).kind(),
            "context_too_large"
        );
    }
}
