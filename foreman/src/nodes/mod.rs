//! The node set: coordinator, planner, react agent, research-team router,
//! workers, validator, reflector, reporter, and the background investigator.

mod coordinator;
mod investigator;
mod planner;
mod react;
mod reflector;
mod reporter;
mod research_team;
mod validator;
mod workers;

pub use coordinator::CoordinatorNode;
pub use investigator::BackgroundInvestigatorNode;
pub use planner::PlannerNode;
pub use react::ReactNode;
pub use reflector::ReflectorNode;
pub use reporter::ReporterNode;
pub use research_team::ResearchTeamNode;
pub use validator::ValidatorNode;
pub use workers::WorkerNode;

use flow_event::{Event, ToolCallPayload};
use futures::StreamExt;

use crate::error::AgentError;
use crate::graph::NodeContext;
use crate::message::ToolCall;
use crate::tools::truncate_tool_output;

/// Cap on tool executions in flight inside one node invocation.
const TOOL_FANOUT_CAP: usize = 8;

/// Races a node-side future against the request's cancel token. LLM streams
/// are dropped (closed) when the caller aborts.
pub(crate) async fn with_cancel<T>(
    ctx: &NodeContext,
    fut: impl std::future::Future<Output = Result<T, AgentError>>,
) -> Result<T, AgentError> {
    tokio::select! {
        _ = ctx.cancel.cancelled() => Err(AgentError::Cancelled),
        result = fut => result,
    }
}

/// Outcome of one tool call: sanitized text on success, the error otherwise.
pub(crate) struct ToolOutcome {
    pub call: ToolCall,
    pub result: Result<String, AgentError>,
}

impl ToolOutcome {
    /// Text for the Tool message: the sanitized result or an error encoding
    /// the validator's heuristics can recognize.
    pub fn content(&self) -> String {
        match &self.result {
            Ok(text) => text.clone(),
            Err(e) => serde_json::json!({"error": e.to_string()}).to_string(),
        }
    }
}

/// Rejects calls the registry should never see: malformed names (the model
/// emitted `tool(...)` syntax), argument blobs that never parsed as JSON, and
/// placeholder values like `{"project_id": "project_id"}` or `"<id>"`.
pub(crate) fn validate_call(call: &ToolCall) -> Option<AgentError> {
    if call.name.is_empty() || call.name.contains('(') || call.name.contains(')') {
        return Some(AgentError::ToolValidation(format!(
            "malformed tool name: {:?}",
            call.name
        )));
    }
    if let serde_json::Value::String(raw) = &call.arguments {
        return Some(AgentError::ToolValidation(format!(
            "arguments are not valid JSON: {raw}"
        )));
    }
    if let Some(obj) = call.arguments.as_object() {
        for (key, value) in obj {
            if let Some(s) = value.as_str() {
                if s == key || (s.starts_with('<') && s.ends_with('>')) {
                    return Some(AgentError::ToolValidation(format!(
                        "placeholder value for {key}: {s}"
                    )));
                }
            }
        }
    }
    None
}

/// Emits the `tool_calls` event, executes all calls concurrently (capped),
/// emits `tool_call_result` events in call order, and returns the outcomes in
/// call order. Cancellation aborts in-flight calls and surfaces `Cancelled`.
pub(crate) async fn run_tool_calls(
    agent: &str,
    message_id: &str,
    calls: &[ToolCall],
    ctx: &NodeContext,
) -> Result<Vec<ToolOutcome>, AgentError> {
    ctx.events
        .emit(Event::ToolCalls {
            agent: agent.to_string(),
            id: message_id.to_string(),
            tool_calls: calls
                .iter()
                .map(|c| ToolCallPayload {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    arguments: c.arguments.clone(),
                })
                .collect(),
        })
        .await;

    let timeout = ctx.shared.config.tool_timeout;
    let budget = ctx.shared.config.tool_output_token_budget;
    let call_futures: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = ToolOutcome> + Send>>> =
        calls
            .iter()
            .map(|call: &ToolCall| {
                let call = call.clone();
                let ctx = ctx.clone();
                let agent = agent.to_string();
                let fut: std::pin::Pin<Box<dyn std::future::Future<Output = ToolOutcome> + Send>> =
                    Box::pin(async move {
                        if let Some(err) = validate_call(&call) {
                            return ToolOutcome {
                                call,
                                result: Err(err),
                            };
                        }
                        let exec = ctx.tools.call(&agent, &call.name, call.arguments.clone());
                        let result = tokio::select! {
                            _ = ctx.cancel.cancelled() => Err(AgentError::Cancelled),
                            timed = tokio::time::timeout(timeout, exec) => match timed {
                                Err(_) => Err(AgentError::ToolTimeout(format!(
                                    "{} exceeded {}s", call.name, timeout.as_secs()
                                ))),
                                Ok(Err(e)) => Err(e.into_agent_error()),
                                Ok(Ok(content)) => Ok(truncate_tool_output(&content.text, budget)),
                            },
                        };
                        ToolOutcome { call, result }
                    });
                fut
            })
            .collect();
    let outcomes: Vec<ToolOutcome> = futures::stream::iter(call_futures)
        .buffered(TOOL_FANOUT_CAP)
        .collect()
        .await;

    if outcomes
        .iter()
        .any(|o| matches!(o.result, Err(AgentError::Cancelled)))
    {
        return Err(AgentError::Cancelled);
    }

    for outcome in &outcomes {
        ctx.events
            .emit(Event::ToolCallResult {
                agent: agent.to_string(),
                id: message_id.to_string(),
                tool_call_id: outcome.call.id.clone(),
                content: outcome.content(),
            })
            .await;
    }
    Ok(outcomes)
}
