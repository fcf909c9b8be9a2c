//! HTTP/SSE transport shell for the foreman engine.
//!
//! One route: `POST /api/chat/stream` takes the request JSON and streams
//! enveloped engine events as `text/event-stream`. Each request gets its own
//! driver; dropping the connection cancels it.

mod app;
mod bootstrap;
mod request;
mod stream;

pub use app::{router, AppState};
pub use bootstrap::build_engine;
pub use request::{ChatStreamRequest, RequestOptions};
pub use stream::EventStream;
