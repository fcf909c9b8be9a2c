//! Graph driver: the per-request node loop.
//!
//! Single-threaded per request: one node at a time, one atomic merge per
//! node. Transient node errors are retried twice (100ms, 400ms); permanent
//! errors become observations and route to the reflector inside the execution
//! loop, otherwise to the reporter. Cancellation is checked between
//! iterations and the loop emits the terminal `error{cancelled}` event
//! itself. Only the validator routes to the reporter on normal completion;
//! the driver additionally guards against a second reporter entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flow_event::Event;

use super::{
    Node, NodeContext, CODER, END, PM_AGENT, REFLECTOR, REPORTER, RESEARCHER, RESEARCH_TEAM,
    VALIDATOR,
};
use crate::error::AgentError;
use crate::state::{Observation, ObservationTag, WorkflowState};

const TRANSIENT_RETRIES: u32 = 2;
const TRANSIENT_BACKOFF: [Duration; 2] =
    [Duration::from_millis(100), Duration::from_millis(400)];
const MAX_ITERATIONS: u32 = 256;

pub struct GraphDriver {
    nodes: HashMap<&'static str, Arc<dyn Node>>,
}

impl Default for GraphDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphDriver {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, node: Arc<dyn Node>) -> &mut Self {
        self.nodes.insert(node.name(), node);
        self
    }

    async fn run_node_with_retry(
        &self,
        node: &Arc<dyn Node>,
        state: &WorkflowState,
        ctx: &NodeContext,
    ) -> Result<crate::state::StateDelta, AgentError> {
        let mut attempt = 0;
        loop {
            match node.run(state, ctx).await {
                Err(e) if e.is_transient() && attempt < TRANSIENT_RETRIES => {
                    tracing::warn!(node = node.name(), attempt, error = %e, "transient node error, retrying");
                    tokio::time::sleep(TRANSIENT_BACKOFF[attempt as usize]).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Runs the loop to completion and returns the final state.
    pub async fn run(&self, mut state: WorkflowState, ctx: &NodeContext) -> WorkflowState {
        let started = tokio::time::Instant::now();
        let mut pipeline_entered = false;
        let mut reporter_done = false;
        let mut iterations = 0u32;
        loop {
            if state.goto == END {
                break;
            }
            if state.goto == super::PLANNER {
                pipeline_entered = true;
            }
            let deadline = if pipeline_entered {
                ctx.shared.config.pipeline_deadline
            } else {
                ctx.shared.config.react_deadline
            };
            if started.elapsed() > deadline && state.goto != REPORTER && !reporter_done {
                state.observations.push(Observation::tagged(
                    "driver",
                    format!("deadline exceeded after {}s", started.elapsed().as_secs()),
                    ObservationTag::DeadlineExceeded,
                ));
                state.goto = REPORTER.to_string();
                continue;
            }
            if ctx.is_cancelled() {
                ctx.events
                    .emit(Event::Error {
                        kind: "cancelled".into(),
                        message: "request aborted by caller".into(),
                    })
                    .await;
                break;
            }
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                ctx.events
                    .emit(Event::Error {
                        kind: "execution_failed".into(),
                        message: "node loop exceeded iteration cap".into(),
                    })
                    .await;
                break;
            }
            if state.goto == REPORTER && reporter_done {
                tracing::error!("second reporter route suppressed");
                break;
            }
            let agent = state.goto.clone();
            let Some(node) = self.nodes.get(agent.as_str()) else {
                ctx.events
                    .emit(Event::Error {
                        kind: "execution_failed".into(),
                        message: format!("unknown node: {agent}"),
                    })
                    .await;
                break;
            };

            let invocation_id = format!("{agent}-{}", uuid::Uuid::new_v4());
            let step = state.current_plan.as_ref().map(|_| state.current_step_index);
            ctx.events
                .emit(Event::TaskStarted {
                    agent: agent.clone(),
                    id: invocation_id.clone(),
                    step,
                })
                .await;
            tracing::debug!(node = %agent, "entering node");

            match self.run_node_with_retry(node, &state, ctx).await {
                Ok(delta) => {
                    if agent == REPORTER {
                        reporter_done = true;
                    }
                    state.apply(delta);
                    let step = state.current_plan.as_ref().map(|_| state.current_step_index);
                    ctx.events
                        .emit(Event::TaskCompleted {
                            agent: agent.clone(),
                            id: invocation_id,
                            step,
                        })
                        .await;
                }
                Err(AgentError::Cancelled) => {
                    ctx.events
                        .emit(Event::Error {
                            kind: "cancelled".into(),
                            message: "request aborted by caller".into(),
                        })
                        .await;
                    break;
                }
                Err(e) => {
                    tracing::warn!(node = %agent, error = %e, "node failed");
                    ctx.events
                        .emit(Event::Error {
                            kind: e.kind().into(),
                            message: e.to_string(),
                        })
                        .await;
                    state.observations.push(Observation::tagged(
                        agent.clone(),
                        format!("{} failed: {e}", agent),
                        match e {
                            AgentError::ToolTimeout(_) => ObservationTag::ToolTimeout,
                            _ => ObservationTag::Error,
                        },
                    ));
                    if agent == REPORTER {
                        break;
                    }
                    // Inside the execution loop, failures feed the reflector
                    // (replan budget permitting); elsewhere they terminate in
                    // the reporter.
                    let in_execution_loop = matches!(
                        agent.as_str(),
                        RESEARCH_TEAM | PM_AGENT | RESEARCHER | CODER | VALIDATOR
                    );
                    let reflectable = matches!(e, AgentError::ContextTooLarge(_))
                        || (in_execution_loop
                            && state.plan_iterations < state.max_replan_iterations);
                    state.goto = if reflectable && agent != REFLECTOR {
                        REFLECTOR.to_string()
                    } else {
                        REPORTER.to_string()
                    };
                }
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::graph::{Context, EventSink};
    use crate::llm::{LlmResponse, MockLlm};
    use crate::state::StateDelta;
    use crate::tools::ToolRegistry;

    fn node_ctx(tx: mpsc::Sender<Event>) -> NodeContext {
        let tools = Arc::new(ToolRegistry::new());
        let shared = Arc::new(Context::for_tests(
            Arc::new(MockLlm::repeating(LlmResponse::text("ok"))),
            Arc::new(MockLlm::repeating(LlmResponse::text("ok"))),
            Arc::clone(&tools),
        ));
        NodeContext::new(shared, tools, EventSink::new(tx), CancellationToken::new())
    }

    struct StaticNode {
        name: &'static str,
        next: &'static str,
    }

    #[async_trait]
    impl Node for StaticNode {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn run(
            &self,
            _state: &WorkflowState,
            _ctx: &NodeContext,
        ) -> Result<StateDelta, AgentError> {
            Ok(StateDelta::goto(self.next))
        }
    }

    struct FlakyNode {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Node for FlakyNode {
        fn name(&self) -> &'static str {
            "coordinator"
        }
        async fn run(
            &self,
            _state: &WorkflowState,
            _ctx: &NodeContext,
        ) -> Result<StateDelta, AgentError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AgentError::LlmTransient("429".into()))
            } else {
                Ok(StateDelta::goto(END))
            }
        }
    }

    struct FailingNode;

    #[async_trait]
    impl Node for FailingNode {
        fn name(&self) -> &'static str {
            "coordinator"
        }
        async fn run(
            &self,
            _state: &WorkflowState,
            _ctx: &NodeContext,
        ) -> Result<StateDelta, AgentError> {
            Err(AgentError::LlmFatal("quota".into()))
        }
    }

    async fn drain(mut rx: mpsc::Receiver<Event>) -> Vec<Event> {
        let mut out = vec![];
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn walks_nodes_until_end() {
        let (tx, rx) = mpsc::channel(64);
        let mut driver = GraphDriver::new();
        driver.add_node(Arc::new(StaticNode {
            name: "coordinator",
            next: "reporter",
        }));
        driver.add_node(Arc::new(StaticNode {
            name: "reporter",
            next: END,
        }));
        let state = WorkflowState::new("t-1");
        let out = driver.run(state, &node_ctx(tx)).await;
        assert_eq!(out.goto, END);
        let events = drain(rx).await;
        let started: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::TaskStarted { agent, .. } => Some(agent.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec!["coordinator", "reporter"]);
    }

    #[tokio::test]
    async fn retries_transient_errors_twice() {
        let (tx, _rx) = mpsc::channel(64);
        let mut driver = GraphDriver::new();
        driver.add_node(Arc::new(FlakyNode {
            attempts: AtomicU32::new(0),
        }));
        let out = driver.run(WorkflowState::new("t-1"), &node_ctx(tx)).await;
        assert_eq!(out.goto, END);
    }

    #[tokio::test]
    async fn permanent_error_routes_to_reporter() {
        let (tx, rx) = mpsc::channel(64);
        let mut driver = GraphDriver::new();
        driver.add_node(Arc::new(FailingNode));
        driver.add_node(Arc::new(StaticNode {
            name: "reporter",
            next: END,
        }));
        let out = driver.run(WorkflowState::new("t-1"), &node_ctx(tx)).await;
        assert_eq!(out.goto, END);
        assert_eq!(out.observations.len(), 1);
        let events = drain(rx).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Error { kind, .. } if kind == "llm_fatal")));
        let reporter_starts = events
            .iter()
            .filter(|e| matches!(e, Event::TaskStarted { agent, .. } if agent == "reporter"))
            .count();
        assert_eq!(reporter_starts, 1);
    }

    #[tokio::test]
    async fn cancelled_token_emits_terminal_error_and_stops() {
        let (tx, rx) = mpsc::channel(64);
        let mut driver = GraphDriver::new();
        driver.add_node(Arc::new(StaticNode {
            name: "coordinator",
            next: "reporter",
        }));
        let ctx = node_ctx(tx);
        ctx.cancel.cancel();
        let out = driver.run(WorkflowState::new("t-1"), &ctx).await;
        assert_eq!(out.goto, "coordinator"); // never entered
        let events = drain(rx).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Error { kind, .. } if kind == "cancelled"));
    }
}
