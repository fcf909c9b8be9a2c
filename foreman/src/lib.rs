//! # Foreman
//!
//! A graph-driven multi-agent workflow engine for project-management
//! assistance. One shared [`WorkflowState`] flows through named nodes; each
//! node returns a partial [`StateDelta`] that the per-request [`GraphDriver`]
//! merges while streaming progressive events to the caller.
//!
//! ## Shape of a run
//!
//! The coordinator gates each request: chit-chat is answered inline, tasks
//! take the fast single-loop [`ReactNode`] path, and escalations (structured
//! signal, error budget, iteration cap, context budget, or the literal
//! planning phrases) re-enter through the planner. The full pipeline walks
//! planner → research_team → worker → validator, looping through the
//! reflector on failure until the replan budget is exhausted, and always
//! terminates in exactly one reporter invocation.
//!
//! ## Main modules
//!
//! - [`graph`]: [`Node`], [`GraphDriver`], [`Context`], [`NodeContext`],
//!   node-name constants.
//! - [`state`]: [`WorkflowState`], [`StateDelta`], [`Plan`], [`Step`],
//!   [`ValidationRecord`].
//! - [`nodes`]: the node set (coordinator, planner, react, router, workers,
//!   validator, reflector, reporter, investigator).
//! - [`llm`]: [`LlmClient`] trait, [`MockLlm`], [`ChatOpenAI`].
//! - [`tokens`] / [`context`]: token-budget coordination and hierarchical
//!   prompt compression.
//! - [`tools`] / [`tool_source`]: tool registry with per-agent scopes, output
//!   truncation, MCP bridge (stdio/HTTP/SSE), provider sync.
//! - [`engine`]: [`Engine`] facade tying it together for the transport.
//!
//! Events are emitted as [`flow_event::Event`] values; the transport wraps
//! them with the envelope and serializes to SSE.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod llm;
pub mod message;
pub mod nodes;
pub mod prompts;
pub mod state;
pub mod tokens;
pub mod tool_source;
pub mod tools;

pub use config::{EngineConfig, McpServerConfig};
pub use engine::{configure_scopes, Engine, IncomingMessage, RunRequest};
pub use error::AgentError;
pub use graph::{Context, EventSink, GraphDriver, Node, NodeContext};
pub use llm::{ChatOpenAI, LlmClient, LlmResponse, MockLlm};
pub use message::{Message, MessageRole, ToolCall};
pub use nodes::ReactNode;
pub use state::{Plan, StateDelta, Step, StepType, ValidationRecord, WorkflowState};
pub use tools::{MockTool, MockToolSource, ToolRegistry};
