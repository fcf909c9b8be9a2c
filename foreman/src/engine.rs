//! Engine facade: builds the node graph once and runs one driver per request.

use std::sync::Arc;

use flow_event::Event;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::graph::{self, Context, EventSink, GraphDriver, NodeContext};
use crate::message::Message;
use crate::nodes::{
    BackgroundInvestigatorNode, CoordinatorNode, PlannerNode, ReactNode, ReflectorNode,
    ReporterNode, ResearchTeamNode, ValidatorNode, WorkerNode,
};
use crate::state::WorkflowState;
use crate::tools::{GetCurrentProject, ToolRegistry, ESCALATE_TOOL_NAME};

/// One incoming message from the transport.
#[derive(Clone, Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// One request as the transport hands it over.
#[derive(Clone, Debug, Deserialize)]
pub struct RunRequest {
    pub thread_id: String,
    #[serde(default)]
    pub model_name: Option<String>,
    pub messages: Vec<IncomingMessage>,
    #[serde(default)]
    pub conversation_history_count: usize,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub investigate: bool,
}

/// Grants the standard per-agent tool scopes given the PM tool names loaded
/// from the tool-protocol server.
pub fn configure_scopes(registry: &ToolRegistry, pm_tools: &[String]) {
    let pm: Vec<&str> = pm_tools.iter().map(String::as_str).collect();
    registry.allow(graph::PM_AGENT, &pm);
    registry.allow(graph::REACT_AGENT, &pm);
    registry.allow(
        graph::REACT_AGENT,
        &[
            "web_search",
            "get_current_project",
            "resolve_project_key",
            "backend_api_call",
            ESCALATE_TOOL_NAME,
        ],
    );
    let read_only: Vec<&str> = pm
        .iter()
        .copied()
        .filter(|n| n.starts_with("get_") || n.starts_with("list_") || n.starts_with("search_"))
        .collect();
    registry.allow(graph::RESEARCHER, &["web_search", "crawl"]);
    registry.allow(graph::RESEARCHER, &read_only);
    registry.allow(graph::BACKGROUND_INVESTIGATOR, &["web_search"]);
}

pub struct Engine {
    shared: Arc<Context>,
    driver: Arc<GraphDriver>,
}

impl Engine {
    pub fn new(context: Context) -> Self {
        let mut driver = GraphDriver::new();
        driver
            .add_node(Arc::new(CoordinatorNode))
            .add_node(Arc::new(ReactNode))
            .add_node(Arc::new(BackgroundInvestigatorNode))
            .add_node(Arc::new(PlannerNode))
            .add_node(Arc::new(ResearchTeamNode))
            .add_node(Arc::new(WorkerNode::pm_agent()))
            .add_node(Arc::new(WorkerNode::researcher()))
            .add_node(Arc::new(WorkerNode::coder()))
            .add_node(Arc::new(ValidatorNode))
            .add_node(Arc::new(ReflectorNode))
            .add_node(Arc::new(ReporterNode));
        Self {
            shared: Arc::new(context),
            driver: Arc::new(driver),
        }
    }

    /// Initial state for one request: transport messages become the
    /// conversation, with the first `conversation_history_count` marked as
    /// frontend-supplied history.
    pub fn initial_state(&self, request: &RunRequest) -> WorkflowState {
        let mut state = WorkflowState::new(&request.thread_id);
        state.max_replan_iterations = self.shared.config.max_replan_iterations;
        state.project_id = request.project_id.clone();
        state.investigate = request.investigate;
        for incoming in &request.messages {
            let mut message = match incoming.role.as_str() {
                "assistant" => Message::assistant("", &incoming.content),
                _ => Message::user(&incoming.content),
            };
            if let Some(ref id) = incoming.id {
                message.id = id.clone();
            }
            state.messages.push(message);
        }
        state.frontend_history_message_count = request
            .conversation_history_count
            .min(state.messages.len().saturating_sub(1));
        state
    }

    /// Starts one request: returns the event stream and the driver handle.
    ///
    /// Cancel the token to abort; the stream ends with `error{cancelled}`.
    pub fn run(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<Event>, JoinHandle<WorkflowState>) {
        let (tx, rx) = mpsc::channel(256);
        let state = self.initial_state(&request);

        let shared = match request.model_name {
            Some(ref model) if !model.is_empty() => {
                let mut ctx = (*self.shared).clone();
                ctx.config.basic_model = model.clone();
                Arc::new(ctx)
            }
            _ => Arc::clone(&self.shared),
        };

        let tools = Arc::new(shared.tools.clone_contents());
        tools.register(Arc::new(GetCurrentProject::new(request.project_id)));
        tools.allow(graph::REACT_AGENT, &["get_current_project"]);

        let node_ctx = NodeContext::new(shared, tools, EventSink::new(tx), cancel);
        let driver = Arc::clone(&self.driver);
        let handle = tokio::spawn(async move { driver.run(state, &node_ctx).await });
        (rx, handle)
    }
}
