//! Request DTO for `POST /api/chat/stream`.

use foreman::{IncomingMessage, RunRequest};
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RequestOptions {
    #[serde(default)]
    pub clarification: bool,
    #[serde(default)]
    pub investigate: bool,
}

/// Wire shape of the stream request. `mcp_settings` is accepted for
/// compatibility but tool servers are connected at startup, not per request.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatStreamRequest {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
    #[serde(default)]
    pub conversation_history_count: usize,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub mcp_settings: Option<serde_json::Value>,
    #[serde(default)]
    pub options: RequestOptions,
}

impl ChatStreamRequest {
    /// Converts to the engine's request, minting a thread id when absent.
    pub fn into_run_request(self) -> RunRequest {
        RunRequest {
            thread_id: self
                .thread_id
                .unwrap_or_else(|| format!("thread-{}", uuid::Uuid::new_v4())),
            model_name: self.model_name,
            messages: self.messages,
            conversation_history_count: self.conversation_history_count,
            project_id: self.project_id,
            investigate: self.options.investigate,
        }
    }
}
