//! Graph layer: node trait, runtime context, and the driver loop.
//!
//! Nodes are named; routing is by name through `WorkflowState::goto`. The
//! driver resolves the cursor, invokes the node, merges its [`StateDelta`],
//! emits lifecycle events, and loops until `__end__` or cancellation.

mod driver;
mod node;
mod runtime;

pub use driver::GraphDriver;
pub use node::Node;
pub use runtime::{Context, EventSink, NodeContext};

/// Node names. Stable strings: they appear in events and in `goto`.
pub const COORDINATOR: &str = "coordinator";
pub const REACT_AGENT: &str = "react_agent";
pub const BACKGROUND_INVESTIGATOR: &str = "background_investigator";
pub const PLANNER: &str = "planner";
pub const RESEARCH_TEAM: &str = "research_team";
pub const PM_AGENT: &str = "pm_agent";
pub const RESEARCHER: &str = "researcher";
pub const CODER: &str = "coder";
pub const VALIDATOR: &str = "validator";
pub const REFLECTOR: &str = "reflector";
pub const REPORTER: &str = "reporter";

/// Terminal sentinel for `goto`.
pub const END: &str = "__end__";
