//! Axum app: state, router, and the stream handler.

use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{KeepAlive, Sse};
use axum::routing::post;
use axum::{Json, Router};
use foreman::Engine;
use tokio_util::sync::CancellationToken;

use crate::request::ChatStreamRequest;
use crate::stream::EventStream;

pub struct AppState {
    pub engine: Engine,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat/stream", post(chat_stream))
        .with_state(state)
}

async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatStreamRequest>,
) -> Sse<EventStream> {
    let run_request = request.into_run_request();
    let thread_id = run_request.thread_id.clone();
    tracing::info!(thread_id = %thread_id, "stream request accepted");

    let cancel = CancellationToken::new();
    let (events, _driver) = state.engine.run(run_request, cancel.clone());
    Sse::new(EventStream::new(events, thread_id, cancel.drop_guard()))
        .keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman::{configure_scopes, Context, LlmResponse, MockLlm, ToolRegistry};
    use futures::StreamExt;

    fn mock_engine() -> Engine {
        let tools = Arc::new(ToolRegistry::new());
        configure_scopes(&tools, &[]);
        Engine::new(Context::for_tests(
            Arc::new(MockLlm::repeating(LlmResponse::text("Hello there!"))),
            Arc::new(MockLlm::repeating(LlmResponse::text("report"))),
            tools,
        ))
    }

    #[tokio::test]
    async fn handler_streams_until_the_run_ends() {
        let state = Arc::new(AppState {
            engine: mock_engine(),
        });
        let request: ChatStreamRequest = serde_json::from_str(
            r#"{"thread_id": "t-1",
                "messages": [{"role": "user", "content": "hi there"}]}"#,
        )
        .unwrap();
        let run_request = request.into_run_request();
        let cancel = CancellationToken::new();
        let (events, driver) = state.engine.run(run_request, cancel.clone());
        let mut stream = EventStream::new(events, "t-1", cancel.drop_guard());
        let mut count = 0;
        while stream.next().await.is_some() {
            count += 1;
        }
        assert!(count >= 2); // at least task_started + task_completed
        driver.await.unwrap();
    }
}
