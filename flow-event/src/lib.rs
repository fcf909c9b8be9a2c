//! Stream event protocol for foreman runs.
//!
//! A run emits a closed set of events (`Event`): node lifecycle, assistant
//! message chunks, structured tool calls and their results, extracted
//! reasoning entries, plan progress, per-message finish reasons, and errors.
//! The wire shape is `{"event": <type>, "data": {...payload}}`; the envelope
//! (`thread_id`, monotonically increasing `seq`) is injected separately so
//! emitters stay transport-agnostic.

mod envelope;
mod event;

pub use envelope::{sse_line, Envelope, EnvelopeState};
pub use event::{Event, FinishReason, ThoughtPayload, ToolCallPayload};
