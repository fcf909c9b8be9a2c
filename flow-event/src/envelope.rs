//! Envelope injection: thread_id + per-stream sequence number.
//!
//! Events are produced without transport context; the stream owner wraps each
//! one with the request's `thread_id` and a monotonically increasing `seq`
//! before it leaves the process. Injection never overwrites payload keys.

use serde_json::Value;

use crate::event::Event;

/// Envelope fields applied to each event's `data` object.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    pub thread_id: Option<String>,
    pub seq: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread_id(mut self, id: impl Into<String>) -> Self {
        self.thread_id = Some(id.into());
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Merges envelope fields into the event's `data` object (top-level only).
    /// Existing keys are kept.
    pub fn inject_into(&self, value: &mut Value) {
        let Some(data) = value.get_mut("data").and_then(Value::as_object_mut) else {
            return;
        };
        if let Some(ref id) = self.thread_id {
            data.entry("thread_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(seq) = self.seq {
            data.entry("seq")
                .or_insert_with(|| Value::Number(serde_json::Number::from(seq)));
        }
    }
}

/// Envelope state for one stream: thread_id plus the next sequence number.
///
/// `seq` is strictly increasing within a stream, so consumers can assert
/// total ordering of the events they received.
pub struct EnvelopeState {
    thread_id: String,
    next_seq: u64,
}

impl EnvelopeState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            next_seq: 1,
        }
    }

    /// Serializes the event, injects the envelope, and advances the sequence.
    pub fn wrap(&mut self, event: &Event) -> Result<Value, serde_json::Error> {
        let mut value = event.to_value()?;
        let env = Envelope::new()
            .with_thread_id(&self.thread_id)
            .with_seq(self.next_seq);
        self.next_seq += 1;
        env.inject_into(&mut value);
        Ok(value)
    }
}

/// Formats one enveloped event as an SSE line (`data: <json>\n\n`).
pub fn sse_line(value: &Value) -> String {
    format!("data: {}\n\n", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_injects_thread_id_and_increments_seq() {
        let mut state = EnvelopeState::new("t-1");
        let ev = Event::MessageChunk {
            agent: "reporter".into(),
            id: "m-1".into(),
            content: "hi".into(),
        };
        let first = state.wrap(&ev).unwrap();
        let second = state.wrap(&ev).unwrap();
        assert_eq!(first["data"]["thread_id"], "t-1");
        assert_eq!(first["data"]["seq"], 1);
        assert_eq!(second["data"]["seq"], 2);
    }

    #[test]
    fn inject_keeps_existing_keys() {
        let mut value = serde_json::json!({
            "event": "error",
            "data": {"thread_id": "already-set", "kind": "cancelled"}
        });
        Envelope::new()
            .with_thread_id("t-2")
            .with_seq(7)
            .inject_into(&mut value);
        assert_eq!(value["data"]["thread_id"], "already-set");
        assert_eq!(value["data"]["seq"], 7);
    }

    #[test]
    fn sse_line_terminates_with_blank_line() {
        let v = serde_json::json!({"event":"error","data":{}});
        let line = sse_line(&v);
        assert!(line.starts_with("data: {"));
        assert!(line.ends_with("\n\n"));
    }
}
